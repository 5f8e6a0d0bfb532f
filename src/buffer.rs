//! Reusable byte arenas for PTY reads. A fixed number of fixed-size
//! buffers circulate between the reader thread and the pool; when all are
//! out, acquisition blocks until one returns. Input is never dropped.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// One reusable read buffer.
#[derive(Debug)]
pub struct BufferObject {
    data: Box<[u8]>,
    len: usize,
}

impl BufferObject {
    fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Writable storage for the next read; resets the fill level.
    pub fn writable(&mut self) -> &mut [u8] {
        self.len = 0;
        &mut self.data
    }

    /// Record how many bytes the read produced.
    pub fn set_filled(&mut self, len: usize) {
        self.len = len.min(self.data.len());
    }

    /// The bytes produced by the last read.
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

struct Shared {
    free: Mutex<Vec<BufferObject>>,
    returned: Condvar,
}

/// Fixed-capacity pool of [`BufferObject`]s.
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<Shared>,
    buffer_size: usize,
}

impl BufferPool {
    pub fn new(count: usize, buffer_size: usize) -> Self {
        let free = (0..count.max(1))
            .map(|_| BufferObject::new(buffer_size))
            .collect();
        Self {
            shared: Arc::new(Shared {
                free: Mutex::new(free),
                returned: Condvar::new(),
            }),
            buffer_size,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Take a buffer, blocking until one is reclaimable.
    pub fn acquire(&self) -> BufferLease {
        let mut free = self.shared.free.lock();
        while free.is_empty() {
            self.shared.returned.wait(&mut free);
        }
        let buffer = free.pop().expect("woken with a free buffer");
        BufferLease {
            shared: Arc::clone(&self.shared),
            buffer: Some(buffer),
        }
    }

    /// Non-blocking variant; `None` when the pool is drained.
    pub fn try_acquire(&self) -> Option<BufferLease> {
        let buffer = self.shared.free.lock().pop()?;
        Some(BufferLease {
            shared: Arc::clone(&self.shared),
            buffer: Some(buffer),
        })
    }

    pub fn available(&self) -> usize {
        self.shared.free.lock().len()
    }
}

/// RAII lease; the buffer returns to the pool on drop.
pub struct BufferLease {
    shared: Arc<Shared>,
    buffer: Option<BufferObject>,
}

impl std::ops::Deref for BufferLease {
    type Target = BufferObject;

    fn deref(&self) -> &BufferObject {
        self.buffer.as_ref().expect("buffer present until drop")
    }
}

impl std::ops::DerefMut for BufferLease {
    fn deref_mut(&mut self) -> &mut BufferObject {
        self.buffer.as_mut().expect("buffer present until drop")
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.shared.free.lock().push(buffer);
            self.shared.returned.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_round_trip() {
        let pool = BufferPool::new(2, 64);
        assert_eq!(pool.available(), 2);
        {
            let mut lease = pool.acquire();
            let writable = lease.writable();
            writable[..5].copy_from_slice(b"hello");
            lease.set_filled(5);
            assert_eq!(lease.filled(), b"hello");
            assert_eq!(pool.available(), 1);
        }
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn exhaustion_blocks_until_return() {
        let pool = BufferPool::new(1, 16);
        let lease = pool.acquire();
        assert!(pool.try_acquire().is_none());

        let pool2 = pool.clone();
        let handle = std::thread::spawn(move || {
            // Blocks until the main thread drops its lease.
            let _lease = pool2.acquire();
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(lease);
        handle.join().unwrap();
        assert_eq!(pool.available(), 1);
    }
}
