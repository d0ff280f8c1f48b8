use crate::types::{CommId, DataType, Rank};

pub type Result<T> = std::result::Result<T, CollError>;

#[derive(Debug, thiserror::Error)]
pub enum CollError {
    #[error("datatype mismatch: send={send}, recv={recv}")]
    TypeMismatch { send: DataType, recv: DataType },

    #[error("{operation}: send count {send} does not match recv count {recv}")]
    CountMismatch {
        operation: &'static str,
        send: usize,
        recv: usize,
    },

    #[error("{operation}: rank {peer} sent {sent} elements, receiver expected {expected}")]
    PeerCountMismatch {
        operation: &'static str,
        peer: Rank,
        sent: usize,
        expected: usize,
    },

    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("{operation}: {len} elements do not split evenly across {world_size} ranks")]
    UnevenSplit {
        operation: &'static str,
        len: usize,
        world_size: usize,
    },

    #[error("{table} table has {actual} entries, communicator has {expected} ranks")]
    TableLength {
        table: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error(
        "{operation}: segment for rank {peer} at offset {offset} (+{len}) exceeds {available} bytes"
    )]
    SegmentOutOfBounds {
        operation: &'static str,
        peer: Rank,
        offset: usize,
        len: usize,
        available: usize,
    },

    #[error("invalid rank {rank}: world size is {world_size}")]
    InvalidRank { rank: Rank, world_size: usize },

    #[error("invalid group size {0}")]
    InvalidGroupSize(usize),

    #[error("rank mapping mismatch for rank {rank}: mapping says {expected}, resolved {actual}")]
    RankMappingMismatch {
        rank: Rank,
        expected: usize,
        actual: usize,
    },

    #[error("rank mapping has {actual} entries, expected {expected}")]
    MappingLength { expected: usize, actual: usize },

    #[error("communicator belongs to rank {actual}, destroy scheduled on rank {expected}")]
    ScheduledRankMismatch { expected: Rank, actual: Rank },

    #[error("communicator {unique_id} already destroyed on rank {rank}")]
    AlreadyDestroyed { unique_id: CommId, rank: Rank },

    #[error("communicator {unique_id} is not registered")]
    UnknownCommunicator { unique_id: CommId },

    #[error("communicator {unique_id} is poisoned by an earlier failed collective")]
    CommunicatorPoisoned { unique_id: CommId },

    #[error("communicator {unique_id} exists with size {existing}, requested {requested}")]
    GroupSizeConflict {
        unique_id: CommId,
        existing: usize,
        requested: usize,
    },

    #[error("rank {rank} already attached to communicator {unique_id}")]
    RankAlreadyAttached { unique_id: CommId, rank: Rank },

    #[error("too many live communicators (limit {limit})")]
    TooManyCommunicators { limit: usize },

    #[error("publication slot for generation {generation} was not reclaimed")]
    SlotNotReclaimed { generation: u64 },

    #[error("failed to allocate {bytes} bytes of scratch space")]
    ScratchAlloc { bytes: usize },

    #[error("{operation} timed out in {phase} after {waited_ms}ms")]
    WaitTimeout {
        operation: &'static str,
        phase: &'static str,
        waited_ms: u64,
    },

    #[error("cannot finalize: {count} communicators still live")]
    LiveCommunicators { count: usize },

    #[error("internal lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("runtime error: {message}")]
    Runtime {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CollError {
    /// Create a `Runtime` error with a message and a source error.
    pub fn runtime_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Runtime {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether the error left the communicator unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CollError::WaitTimeout { .. } | CollError::CommunicatorPoisoned { .. }
        )
    }
}
