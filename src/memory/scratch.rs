use crossbeam_queue::ArrayQueue;
use std::ops::Deref;
use std::sync::Arc;

use crate::config::CollConfig;
use crate::error::{CollError, Result};

/// A lock-free pool of scratch buffers for in-place collectives.
///
/// An in-place call must copy its outgoing data somewhere stable before
/// publishing it, because the rank overwrites its receive buffer while
/// peers are still reading. Buffers up to `buf_capacity` bytes are recycled
/// through the pool; larger requests are allocated fresh and freed on drop.
pub struct ScratchPool {
    free: ArrayQueue<Vec<u8>>,
    buf_capacity: usize,
}

impl ScratchPool {
    /// Create an empty pool that recycles up to `count` buffers of
    /// `buf_capacity` bytes. Buffers are allocated lazily on first checkout.
    pub fn new(count: usize, buf_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            free: ArrayQueue::new(count.max(1)),
            buf_capacity,
        })
    }

    pub fn from_config(cfg: &CollConfig) -> Arc<Self> {
        Self::new(cfg.scratch_pool_buffers, cfg.scratch_buf_capacity)
    }

    /// Check out a scratch buffer holding a copy of `src`.
    ///
    /// Allocation is fallible: a failed reservation is reported as
    /// `ScratchAlloc` rather than aborting the process.
    pub fn copy_of(self: &Arc<Self>, src: &[u8]) -> Result<ScratchBuf> {
        let len = src.len();
        let pooled = len <= self.buf_capacity;
        let mut buf = if pooled {
            self.free.pop().unwrap_or_default()
        } else {
            Vec::new()
        };
        buf.clear();
        let want = if pooled { self.buf_capacity } else { len };
        buf.try_reserve_exact(want)
            .map_err(|_| CollError::ScratchAlloc { bytes: len })?;
        buf.extend_from_slice(src);
        Ok(ScratchBuf {
            buf: Some(buf),
            pool: Arc::clone(self),
            pooled,
        })
    }

    /// Number of idle buffers currently held by the pool.
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    fn return_buf(&self, mut buf: Vec<u8>) {
        if buf.capacity() <= self.buf_capacity * 4 {
            buf.clear();
            let _ = self.free.push(buf);
        }
    }
}

/// A scratch buffer checked out from a `ScratchPool`. Derefs to `[u8]`.
/// On drop, poolable buffers go back to the pool; others are freed.
pub struct ScratchBuf {
    buf: Option<Vec<u8>>,
    pool: Arc<ScratchPool>,
    pooled: bool,
}

impl Deref for ScratchBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl Drop for ScratchBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take()
            && self.pooled
        {
            self.pool.return_buf(buf);
        }
    }
}
