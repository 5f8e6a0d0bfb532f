//! Double-buffered render state with the
//! `WaitingForRefresh → RefreshBuffersAndTrySwap → TrySwapBuffers` cycle.
//! The producer fills the back buffer under its own lock; consumers read
//! the front buffer through an RAII guard without the terminal mutex.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use super::frame::RenderBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderBufferState {
    WaitingForRefresh,
    RefreshBuffersAndTrySwap,
    TrySwapBuffers,
}

impl RenderBufferState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RenderBufferState::RefreshBuffersAndTrySwap,
            2 => RenderBufferState::TrySwapBuffers,
            _ => RenderBufferState::WaitingForRefresh,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RenderBufferState::WaitingForRefresh => 0,
            RenderBufferState::RefreshBuffersAndTrySwap => 1,
            RenderBufferState::TrySwapBuffers => 2,
        }
    }
}

/// RAII read handle on the front buffer.
pub struct RenderBufferRef<'a> {
    guard: RwLockReadGuard<'a, RenderBuffer>,
}

impl std::ops::Deref for RenderBufferRef<'_> {
    type Target = RenderBuffer;

    fn deref(&self) -> &RenderBuffer {
        &self.guard
    }
}

pub struct RenderDoubleBuffer {
    buffers: [RwLock<RenderBuffer>; 2],
    front: AtomicUsize,
    state: AtomicU8,
    frame_counter: AtomicU64,
    last_update: Mutex<Option<Instant>>,
}

impl Default for RenderDoubleBuffer {
    fn default() -> Self {
        Self {
            buffers: [
                RwLock::new(RenderBuffer::default()),
                RwLock::new(RenderBuffer::default()),
            ],
            front: AtomicUsize::new(0),
            state: AtomicU8::new(RenderBufferState::WaitingForRefresh.as_u8()),
            frame_counter: AtomicU64::new(0),
            last_update: Mutex::new(None),
        }
    }
}

impl RenderDoubleBuffer {
    pub fn state(&self) -> RenderBufferState {
        RenderBufferState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Force the next [`RenderDoubleBuffer::refresh_with`] to run even if
    /// the refresh interval has not elapsed.
    pub fn request_refresh(&self) {
        self.state.store(
            RenderBufferState::RefreshBuffersAndTrySwap.as_u8(),
            Ordering::Release,
        );
    }

    /// Rate-gated refresh: fills the back buffer via `fill`, then swaps it
    /// to the front. Returns false when gated away.
    pub fn refresh_with<F>(&self, now: Instant, interval: Duration, fill: F) -> bool
    where
        F: FnOnce(&mut RenderBuffer),
    {
        if self.state() == RenderBufferState::WaitingForRefresh {
            let last = *self.last_update.lock();
            if let Some(last) = last {
                if now.duration_since(last) < interval {
                    return false;
                }
            }
        }
        self.state.store(
            RenderBufferState::RefreshBuffersAndTrySwap.as_u8(),
            Ordering::Release,
        );

        let back_index = 1 - self.front.load(Ordering::Acquire);
        {
            let mut back = self.buffers[back_index].write();
            fill(&mut back);
            back.frame_id = self.frame_counter.fetch_add(1, Ordering::AcqRel) + 1;
            back.timestamp = Some(now);
        }

        self.state.store(
            RenderBufferState::TrySwapBuffers.as_u8(),
            Ordering::Release,
        );
        self.front.store(back_index, Ordering::Release);
        *self.last_update.lock() = Some(now);
        self.state.store(
            RenderBufferState::WaitingForRefresh.as_u8(),
            Ordering::Release,
        );
        true
    }

    /// Read access to the most recently swapped front buffer.
    pub fn front(&self) -> RenderBufferRef<'_> {
        let index = self.front.load(Ordering::Acquire);
        RenderBufferRef {
            guard: self.buffers[index].read(),
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_swaps_and_gates() {
        let buffers = RenderDoubleBuffer::default();
        let start = Instant::now();
        let interval = Duration::from_millis(16);

        assert!(buffers.refresh_with(start, interval, |b| {
            b.columns_total = 80;
        }));
        assert_eq!(buffers.front().frame_id, 1);
        assert_eq!(buffers.front().columns_total, 80);

        // A second refresh inside the interval is coalesced away.
        assert!(!buffers.refresh_with(start + Duration::from_millis(1), interval, |b| {
            b.columns_total = 100;
        }));
        assert_eq!(buffers.front().columns_total, 80);

        // After the interval it goes through.
        assert!(buffers.refresh_with(start + interval, interval, |b| {
            b.columns_total = 100;
        }));
        assert_eq!(buffers.front().frame_id, 2);
        assert_eq!(buffers.front().columns_total, 100);
    }

    #[test]
    fn request_refresh_overrides_the_gate() {
        let buffers = RenderDoubleBuffer::default();
        let start = Instant::now();
        let interval = Duration::from_secs(60);
        assert!(buffers.refresh_with(start, interval, |_| {}));
        buffers.request_refresh();
        assert_eq!(
            buffers.state(),
            RenderBufferState::RefreshBuffersAndTrySwap
        );
        assert!(buffers.refresh_with(start, interval, |_| {}));
    }
}
