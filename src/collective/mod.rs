mod allgather;
mod alltoall;
mod alltoallv;
mod exchange;

pub(crate) use allgather::allgather;
pub(crate) use alltoall::alltoall;
pub(crate) use alltoallv::alltoallv;
