//! Shared pool of reusable message buffers.
//!
//! Stream adapters borrow a `BytesMut` sized to the message buffer limit,
//! fill it, split frames off it and hand it back when the stream closes.
//!
//! # Usage
//!
//! ```
//! use ws_outgoing::protocol::BufferPool;
//!
//! let pool = BufferPool::new(4);
//! let buf = pool.acquire(1024);
//! assert!(buf.capacity() >= 1024);
//! pool.release(buf);
//! assert_eq!(pool.idle_count(), 1);
//! ```

use std::sync::Mutex;

use bytes::BytesMut;

/// Default number of idle buffers kept around.
pub const DEFAULT_POOL_SIZE: usize = 16;

/// A pool of reusable buffers, shared by every endpoint of a container.
#[derive(Debug)]
pub struct BufferPool {
    /// Idle buffers ready for reuse.
    idle: Mutex<Vec<BytesMut>>,
    /// Maximum idle buffers retained.
    max_idle: usize,
}

impl BufferPool {
    /// Create a pool that retains up to `max_idle` buffers.
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
        }
    }

    /// Take a cleared buffer with at least `capacity` bytes reserved.
    pub fn acquire(&self, capacity: usize) -> BytesMut {
        let reused = self.lock().pop();
        match reused {
            Some(mut buf) => {
                buf.clear();
                buf.reserve(capacity);
                buf
            }
            None => BytesMut::with_capacity(capacity),
        }
    }

    /// Return a buffer. Dropped if the pool is full.
    pub fn release(&self, buf: BytesMut) {
        let mut idle = self.lock();
        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }

    /// Number of idle buffers currently held.
    pub fn idle_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<BytesMut>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}
