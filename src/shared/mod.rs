//! State shared by the ranks of one communicator: the publication slot ring
//! and the barrier that guards slot reuse.

pub(crate) mod barrier;
pub(crate) mod region;
pub(crate) mod slot;

pub(crate) use region::SharedRegion;
