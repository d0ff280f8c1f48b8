//! Node-local collective communication over shared memory.
//!
//! A [`CollContext`] hands out communicator ids and owns the registry of
//! shared regions. Each participating rank builds its own [`Communicator`]
//! from an id (and, across processes, a rank mapping), runs any number of
//! [`alltoall`](Communicator::alltoall) / [`alltoallv`](Communicator::alltoallv)
//! / [`allgather`](Communicator::allgather) calls on it, and destroys it once.
//!
//! Collectives never copy through a central coordinator: each rank publishes
//! a pointer to its outgoing data, pulls what it needs straight out of its
//! peers' buffers, and meets them at a barrier before the publication slot
//! can be reused.

pub mod bootstrap;
mod collective;
pub mod comm;
pub mod config;
pub mod context;
pub mod error;
pub mod memory;
mod shared;
pub mod types;
pub mod wait;

pub use bootstrap::{bootstrap_local, destroy_local, resolve_physical_rank};
pub use comm::{CommState, Communicator};
pub use config::CollConfig;
pub use context::CollContext;
pub use error::{CollError, Result};
pub use memory::{BufferView, BufferViewMut, SendSource};
pub use types::{CollElement, CommId, DataType, Rank};
pub use wait::WaitPolicy;
