//! Size-classed scratch buffer pool.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Buffer sizes handed out by the pool, smallest first.
pub const SIZE_CLASSES: [usize; 4] = [16 * 1024, 32 * 1024, 64 * 1024, 80 * 1024];

/// Default number of idle buffers kept per size class.
pub const DEFAULT_MAX_RETAINED: usize = 32;

static SHARED_POOL: OnceLock<Arc<BufferPool>> = OnceLock::new();

/// A pool of reusable byte buffers.
///
/// Requests larger than the biggest size class are served with a fresh
/// allocation that is simply freed on return.
#[derive(Debug)]
pub struct BufferPool {
    classes: [Mutex<Vec<Vec<u8>>>; 4],
    max_retained: usize,
    outstanding: AtomicUsize,
}

impl BufferPool {
    /// Create a pool keeping at most `max_retained` idle buffers per class.
    pub fn new(max_retained: usize) -> Self {
        Self {
            classes: Default::default(),
            max_retained,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// The process-wide pool.
    pub fn shared() -> Arc<BufferPool> {
        SHARED_POOL
            .get_or_init(|| Arc::new(BufferPool::new(DEFAULT_MAX_RETAINED)))
            .clone()
    }

    /// Rent a buffer of at least `min_len` bytes.
    ///
    /// The buffer's length is its size class, not `min_len`.
    pub fn rent(self: &Arc<Self>, min_len: usize) -> PooledBuffer {
        let class = SIZE_CLASSES.iter().position(|&size| size >= min_len);
        let buffer = match class {
            Some(idx) => {
                let reused = self.classes[idx]
                    .lock()
                    .expect("buffer pool mutex poisoned")
                    .pop();
                reused.unwrap_or_else(|| vec![0u8; SIZE_CLASSES[idx]])
            }
            None => vec![0u8; min_len],
        };
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        PooledBuffer {
            buffer: Some(buffer),
            class,
            pool: Arc::clone(self),
        }
    }

    /// Number of buffers currently rented and not yet returned.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// Number of idle buffers held across all classes.
    pub fn retained(&self) -> usize {
        self.classes
            .iter()
            .map(|c| c.lock().expect("buffer pool mutex poisoned").len())
            .sum()
    }

    /// Release every idle buffer back to the allocator.
    ///
    /// Returns the number of bytes freed.
    pub fn trim(&self) -> usize {
        let mut freed = 0;
        for (idx, class) in self.classes.iter().enumerate() {
            let mut idle = class.lock().expect("buffer pool mutex poisoned");
            freed += idle.len() * SIZE_CLASSES[idx];
            idle.clear();
            idle.shrink_to_fit();
        }
        if freed > 0 {
            tracing::debug!(freed_bytes = freed, "Buffer pool trimmed");
        }
        freed
    }

    fn give_back(&self, class: Option<usize>, buffer: Vec<u8>) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        let Some(idx) = class else {
            return;
        };
        let mut idle = self.classes[idx]
            .lock()
            .expect("buffer pool mutex poisoned");
        if idle.len() < self.max_retained {
            idle.push(buffer);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETAINED)
    }
}

/// A rented buffer. Goes back to its pool on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: Option<Vec<u8>>,
    class: Option<usize>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.buffer.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffer.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.give_back(self.class, buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rent_rounds_up_to_size_class() {
        let pool = Arc::new(BufferPool::new(4));
        let small = pool.rent(100);
        assert_eq!(small.len(), 16 * 1024);
        let mid = pool.rent(20_000);
        assert_eq!(mid.len(), 32 * 1024);
        let oversized = pool.rent(200_000);
        assert_eq!(oversized.len(), 200_000);
        assert_eq!(pool.outstanding(), 3);
    }

    #[test]
    fn dropped_buffers_are_reused() {
        let pool = Arc::new(BufferPool::new(4));
        {
            let _a = pool.rent(1024);
            let _b = pool.rent(1024);
        }
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.retained(), 2);

        let _c = pool.rent(1024);
        assert_eq!(pool.retained(), 1);
    }

    #[test]
    fn retention_is_capped() {
        let pool = Arc::new(BufferPool::new(1));
        {
            let _a = pool.rent(1);
            let _b = pool.rent(1);
            let _c = pool.rent(1);
        }
        assert_eq!(pool.retained(), 1);
    }

    #[test]
    fn oversized_buffers_are_not_retained() {
        let pool = Arc::new(BufferPool::new(4));
        drop(pool.rent(1024 * 1024));
        assert_eq!(pool.retained(), 0);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn trim_releases_idle_buffers() {
        let pool = Arc::new(BufferPool::new(4));
        drop(pool.rent(1));
        drop(pool.rent(40_000));
        assert_eq!(pool.trim(), 16 * 1024 + 64 * 1024);
        assert_eq!(pool.retained(), 0);
    }

    #[test]
    fn buffer_returns_on_panic() {
        let pool = Arc::new(BufferPool::new(4));
        let p = pool.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _buf = p.rent(10);
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(pool.outstanding(), 0);
    }
}
