pub mod buffer;
pub mod scratch;

pub use buffer::{BufferView, BufferViewMut, SendSource};
pub use scratch::{ScratchBuf, ScratchPool};
