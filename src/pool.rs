//! Fixed buffer pool for sample-frame transactions.
//!
//! The acquisition worker loans one buffer per bus transaction, copies the
//! frame out into an event, and returns the buffer before the next trigger.
//! Slot count and slot length are fixed at construction; when every slot is
//! loaned out, `try_acquire` reports exhaustion and the caller drops that
//! sample rather than waiting. Release can never fail or block, so a loan
//! going out of scope on any path puts its slot back.
//!
//! ## Memory Flow
//!
//! ```text
//! 1. BufferPool pre-allocates `slots` buffers of `slot_len` bytes
//! 2. try_acquire() pops a buffer; None means exhausted (backpressure)
//! 3. The bus reads a frame into the buffer (mutable via DerefMut)
//! 4. The worker copies the frame into an Event and drops the loan
//! 5. Drop zeroes the buffer and pushes it back onto the free queue
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use tracing::{error, info};

use crate::error::{BfpError, BfpResult};

/// Internal state shared between the pool and its outstanding loans.
struct BufferPoolInner {
    /// Lock-free queue of idle buffers.
    free_buffers: ArrayQueue<Vec<u8>>,
    /// Length of each buffer in bytes.
    slot_len: usize,
    /// Total number of buffers in the pool.
    slots: usize,
    /// Number of buffers currently idle.
    available: AtomicUsize,
    /// Metrics: successful acquires.
    total_acquires: AtomicU64,
    /// Metrics: acquires rejected because every slot was loaned out.
    exhausted: AtomicU64,
}

/// Pool of pre-allocated, fixed-length byte buffers.
///
/// Loans are returned automatically when dropped. Thread-safe; `try_acquire`
/// is wait-free and safe to call from the trigger path.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

impl BufferPool {
    /// Creates a pool of `slots` buffers, each `slot_len` bytes, all zeroed.
    ///
    /// Zero slots or a zero slot length is a configuration error.
    pub fn new(slots: usize, slot_len: usize) -> BfpResult<Self> {
        if slots == 0 {
            return Err(BfpError::Configuration(
                "buffer pool needs at least one slot".into(),
            ));
        }
        if slot_len == 0 {
            return Err(BfpError::Configuration(
                "buffer pool slot length must be non-zero".into(),
            ));
        }

        let free_buffers = ArrayQueue::new(slots);
        for _ in 0..slots {
            // Queue capacity equals the buffer count; these pushes cannot fail.
            let _ = free_buffers.push(vec![0u8; slot_len]);
        }

        info!(slots, slot_len, "buffer pool created");

        Ok(Self {
            inner: Arc::new(BufferPoolInner {
                free_buffers,
                slot_len,
                slots,
                available: AtomicUsize::new(slots),
                total_acquires: AtomicU64::new(0),
                exhausted: AtomicU64::new(0),
            }),
        })
    }

    /// Tries to loan a buffer without blocking.
    ///
    /// Returns `None` when every slot is loaned out; the failed attempt is
    /// counted so callers can report sustained exhaustion.
    #[must_use]
    pub fn try_acquire(&self) -> Option<PooledBuffer> {
        match self.inner.free_buffers.pop() {
            Some(buffer) => {
                self.inner.available.fetch_sub(1, Ordering::Relaxed);
                self.inner.total_acquires.fetch_add(1, Ordering::Relaxed);
                Some(PooledBuffer {
                    buffer: Some(buffer),
                    pool: Arc::clone(&self.inner),
                })
            }
            None => {
                self.inner.exhausted.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Number of currently idle buffers.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.available.load(Ordering::Relaxed)
    }

    /// Total number of buffers in the pool.
    #[must_use]
    pub fn slots(&self) -> usize {
        self.inner.slots
    }

    /// Length of each buffer in bytes.
    #[must_use]
    pub fn slot_len(&self) -> usize {
        self.inner.slot_len
    }

    /// Successful acquires since pool creation.
    #[must_use]
    pub fn total_acquires(&self) -> u64 {
        self.inner.total_acquires.load(Ordering::Relaxed)
    }

    /// Acquire attempts rejected for exhaustion since pool creation.
    #[must_use]
    pub fn exhausted_count(&self) -> u64 {
        self.inner.exhausted.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("slots", &self.inner.slots)
            .field("slot_len", &self.inner.slot_len)
            .field("available", &self.available())
            .finish()
    }
}

/// A buffer loaned from the pool, returned automatically on drop.
pub struct PooledBuffer {
    /// The buffer itself; `None` only during drop.
    buffer: Option<Vec<u8>>,
    /// Pool to return the buffer to.
    pool: Arc<BufferPoolInner>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buffer.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buffer.as_deref_mut().unwrap_or(&mut [])
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl AsMut<[u8]> for PooledBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        self
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(mut buffer) = self.buffer.take() {
            // Scrub before reuse so stale frames never leak into later events.
            buffer.fill(0);
            if self.pool.free_buffers.push(buffer).is_err() {
                // Queue capacity equals the number of buffers ever created,
                // so this is unreachable; losing the slot is the safe outcome.
                error!("buffer pool free queue rejected a returned slot");
                return;
            }
            self.pool.available.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_creation() {
        let pool = BufferPool::new(4, 27).expect("valid pool");
        assert_eq!(pool.slots(), 4);
        assert_eq!(pool.available(), 4);
        assert_eq!(pool.slot_len(), 27);
    }

    #[test]
    fn test_zero_sized_pools_are_rejected() {
        assert!(matches!(
            BufferPool::new(0, 27),
            Err(BfpError::Configuration(_))
        ));
        assert!(matches!(
            BufferPool::new(4, 0),
            Err(BfpError::Configuration(_))
        ));
    }

    #[test]
    fn test_try_acquire_exhaustion_and_release() {
        let pool = BufferPool::new(2, 16).expect("valid pool");

        let buf1 = pool.try_acquire();
        assert!(buf1.is_some());
        assert_eq!(pool.available(), 1);

        let buf2 = pool.try_acquire();
        assert!(buf2.is_some());
        assert_eq!(pool.available(), 0);

        // Pool exhausted
        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.exhausted_count(), 1);

        // Return one
        drop(buf1);
        assert_eq!(pool.available(), 1);

        // Can acquire again
        assert!(pool.try_acquire().is_some());
        drop(buf2);
    }

    #[test]
    fn test_release_zeroes_the_slot() {
        let pool = BufferPool::new(1, 8).expect("valid pool");

        let mut buf = pool.try_acquire().expect("slot available");
        buf.copy_from_slice(&[0xAB; 8]);
        drop(buf);

        let buf = pool.try_acquire().expect("slot returned");
        assert_eq!(&buf[..], &[0u8; 8]);
    }

    #[test]
    fn test_loans_keep_pool_alive() {
        let pool = BufferPool::new(1, 8).expect("valid pool");
        let buf = pool.try_acquire().expect("slot available");
        drop(pool);
        // Returning into a dropped pool handle must not panic.
        drop(buf);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_release() {
        let pool = BufferPool::new(4, 32).expect("valid pool");

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..100 {
                    if let Some(mut buf) = pool.try_acquire() {
                        buf[0] = 0xFF;
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        for task in tasks {
            task.await.expect("task completes");
        }

        assert_eq!(pool.available(), 4);
        assert_eq!(
            pool.total_acquires() + pool.exhausted_count(),
            8 * 100
        );
    }
}
