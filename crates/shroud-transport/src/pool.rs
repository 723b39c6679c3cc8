//! Reusable scratch buffers
//!
//! Connections draw read chunks and outbound container buffers from a
//! [`BufferPool`] instead of allocating per call. Buffers are cleared before
//! they go back on the free list and must not outlive their guard.

use bytes::BytesMut;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Initial capacity of a freshly allocated buffer
pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024;

/// Free-list length kept by default
pub const DEFAULT_MAX_RETAINED: usize = 64;

/// Buffers larger than this are dropped instead of recycled
const MAX_RECYCLED_CAPACITY: usize = 4 * 1024 * 1024;

static SHARED: Lazy<Arc<BufferPool>> = Lazy::new(|| {
    Arc::new(BufferPool::new(
        DEFAULT_BUFFER_CAPACITY,
        DEFAULT_MAX_RETAINED,
    ))
});

/// Free list of byte buffers
pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
    buffer_capacity: usize,
    max_retained: usize,
}

impl BufferPool {
    /// Pool handing out buffers of `buffer_capacity`, keeping up to `max_retained`
    pub fn new(buffer_capacity: usize, max_retained: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_retained)),
            buffer_capacity,
            max_retained,
        }
    }

    /// Process-wide pool for callers that do not inject their own
    pub fn shared() -> Arc<BufferPool> {
        Arc::clone(&SHARED)
    }

    /// Take an empty buffer, allocating if the free list is empty
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let buf = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.buffer_capacity));
        PooledBuffer {
            buf: Some(buf),
            pool: Arc::clone(self),
        }
    }

    /// Buffers currently on the free list
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    fn release(&self, mut buf: BytesMut) {
        if buf.capacity() > MAX_RECYCLED_CAPACITY {
            return;
        }
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(buf);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY, DEFAULT_MAX_RETAINED)
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("available", &self.available())
            .field("buffer_capacity", &self.buffer_capacity)
            .field("max_retained", &self.max_retained)
            .finish()
    }
}

/// A buffer on loan from a [`BufferPool`]; returned on drop
pub struct PooledBuffer {
    buf: Option<BytesMut>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        // Only None inside drop
        self.buf.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        self.buf.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
