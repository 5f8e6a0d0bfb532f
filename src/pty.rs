//! PTY abstraction. The core only speaks [`Pty`]; [`ProcessPty`] is the
//! default implementation, spawning a child process behind a
//! `portable-pty` pair with an internal read pump so reads can be timed
//! and woken.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use crate::buffer::BufferObject;
use crate::grid::PageSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelSize {
    pub width: u16,
    pub height: u16,
}

/// The PTY contract the terminal façade drives.
pub trait Pty: Send + Sync {
    fn page_size(&self) -> PageSize;

    /// Timed read into `into`. `Ok(None)` means timeout or explicit
    /// wakeup; `Ok(Some((n, fast_pipe)))` delivered `n` bytes. Errors are
    /// fatal unless transient (`Interrupted`/`WouldBlock`).
    fn read(
        &self,
        into: &mut BufferObject,
        timeout: Duration,
        max: usize,
    ) -> io::Result<Option<(usize, bool)>>;

    /// Non-blocking-ish write; partial writes are fine and re-queued by
    /// the caller.
    fn write(&self, bytes: &[u8]) -> io::Result<usize>;

    fn resize(&self, cells: PageSize, pixels: Option<PixelSize>) -> io::Result<()>;

    /// Interrupt a blocked [`Pty::read`] so the reader loop can observe
    /// state changes.
    fn wakeup_reader(&self);

    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// A real child process on a PTY pair.
pub struct ProcessPty {
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    writer: Mutex<Box<dyn Write + Send>>,
    data_rx: Receiver<Vec<u8>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    /// Chunk bytes not yet handed to a reader.
    pending: Mutex<Vec<u8>>,
    pump: Mutex<Option<std::thread::JoinHandle<()>>>,
    size: Mutex<PageSize>,
    closed: AtomicBool,
}

fn to_io_error(e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

impl ProcessPty {
    pub fn spawn(
        command: CommandBuilder,
        cells: PageSize,
        pixels: Option<PixelSize>,
    ) -> io::Result<Self> {
        let pty_size = PtySize {
            rows: cells.lines,
            cols: cells.columns,
            pixel_width: pixels.map(|p| p.width).unwrap_or(0),
            pixel_height: pixels.map(|p| p.height).unwrap_or(0),
        };
        let pair = native_pty_system()
            .openpty(pty_size)
            .map_err(to_io_error)?;
        let child = pair.slave.spawn_command(command).map_err(to_io_error)?;
        drop(pair.slave);
        let mut reader = pair.master.try_clone_reader().map_err(to_io_error)?;
        let writer = pair.master.take_writer().map_err(to_io_error)?;

        let (data_tx, data_rx) = bounded::<Vec<u8>>(32);
        let (wake_tx, wake_rx) = bounded::<()>(1);

        let pump = std::thread::Builder::new()
            .name("pty-read-pump".to_string())
            .spawn(move || {
                let mut buf = [0u8; 8192];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if data_tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            tracing::debug!(error = %e, "pty read pump ending");
                            break;
                        }
                    }
                }
                // Dropping data_tx signals EOF to timed readers.
            })?;

        Ok(Self {
            master: Mutex::new(Some(pair.master)),
            child: Mutex::new(child),
            writer: Mutex::new(writer),
            data_rx,
            wake_tx,
            wake_rx,
            pending: Mutex::new(Vec::new()),
            pump: Mutex::new(Some(pump)),
            size: Mutex::new(cells),
            closed: AtomicBool::new(false),
        })
    }

    /// Deliver pending bytes into the caller's buffer, stashing overflow.
    fn deliver(&self, chunk: &[u8], into: &mut BufferObject, max: usize) -> usize {
        let cap = max.min(into.capacity());
        let n = chunk.len().min(cap);
        into.writable()[..n].copy_from_slice(&chunk[..n]);
        into.set_filled(n);
        if n < chunk.len() {
            let mut pending = self.pending.lock();
            let mut rest = chunk[n..].to_vec();
            rest.extend_from_slice(&pending);
            *pending = rest;
        }
        n
    }

    /// Child shutdown: the hangup from `kill()` is usually enough, so poll
    /// for the exit within a grace window before escalating to a SIGKILL
    /// of the child's process group (the child leads it; `killpg` reaches
    /// any grandchildren too).
    fn terminate_child(&self) {
        const KILL_GRACE: Duration = Duration::from_millis(250);

        let mut child = self.child.lock();
        if matches!(child.try_wait(), Ok(Some(_))) {
            return; // already exited and reaped
        }
        let pid = child.process_id();
        if let Err(e) = child.kill() {
            tracing::debug!(error = %e, "child hangup signal failed");
        }

        let deadline = std::time::Instant::now() + KILL_GRACE;
        while std::time::Instant::now() < deadline {
            if matches!(child.try_wait(), Ok(Some(_))) {
                return;
            }
            std::thread::park_timeout(KILL_GRACE / 10);
        }

        tracing::debug!(pid, "child ignored hangup, killing its process group");
        #[cfg(unix)]
        if let Some(pid) = pid {
            unsafe {
                libc::killpg(pid as libc::pid_t, libc::SIGKILL);
            }
        }
        let _ = child.try_wait();
    }

    /// Exit status if the child has terminated.
    pub fn try_wait(&self) -> Option<portable_pty::ExitStatus> {
        self.child.lock().try_wait().ok().flatten()
    }
}

impl Pty for ProcessPty {
    fn page_size(&self) -> PageSize {
        *self.size.lock()
    }

    fn read(
        &self,
        into: &mut BufferObject,
        timeout: Duration,
        max: usize,
    ) -> io::Result<Option<(usize, bool)>> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pty closed"));
        }

        let stashed = std::mem::take(&mut *self.pending.lock());
        if !stashed.is_empty() {
            let n = self.deliver(&stashed, into, max);
            return Ok(Some((n, false)));
        }

        crossbeam_channel::select! {
            recv(self.data_rx) -> msg => match msg {
                Ok(chunk) => {
                    let n = self.deliver(&chunk, into, max);
                    Ok(Some((n, false)))
                }
                Err(_) => {
                    // Pump ended: child EOF.
                    self.closed.store(true, Ordering::Release);
                    Err(io::Error::new(io::ErrorKind::UnexpectedEof, "pty EOF"))
                }
            },
            recv(self.wake_rx) -> _ => Ok(None),
            default(timeout) => Ok(None),
        }
    }

    fn write(&self, bytes: &[u8]) -> io::Result<usize> {
        let mut writer = self.writer.lock();
        let n = writer.write(bytes)?;
        writer.flush()?;
        Ok(n)
    }

    fn resize(&self, cells: PageSize, pixels: Option<PixelSize>) -> io::Result<()> {
        let master = self.master.lock();
        let master = master
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "pty master closed"))?;
        master
            .resize(PtySize {
                rows: cells.lines,
                cols: cells.columns,
                pixel_width: pixels.map(|p| p.width).unwrap_or(0),
                pixel_height: pixels.map(|p| p.height).unwrap_or(0),
            })
            .map_err(to_io_error)?;
        *self.size.lock() = cells;
        Ok(())
    }

    fn wakeup_reader(&self) {
        let _ = self.wake_tx.try_send(());
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.terminate_child();
        // Dropping the master closes the fd, unblocking the pump thread.
        drop(self.master.lock().take());
        if let Some(pump) = self.pump.lock().take() {
            let _ = pump.join();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for ProcessPty {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;

    #[cfg(unix)]
    #[test]
    fn spawn_read_write_close() {
        let mut command = CommandBuilder::new("cat");
        command.env("TERM", "xterm-256color");
        let pty = ProcessPty::spawn(command, PageSize::new(24, 80), None).expect("spawn cat");
        assert!(!pty.is_closed());

        pty.write(b"roundtrip\n").expect("write to cat");

        let pool = BufferPool::new(2, 4096);
        let mut buffer = pool.acquire();
        let mut collected = Vec::new();
        for _ in 0..50 {
            match pty.read(&mut buffer, Duration::from_millis(100), 4096) {
                Ok(Some((n, _))) if n > 0 => {
                    collected.extend_from_slice(buffer.filled());
                    if collected.windows(9).any(|w| w == b"roundtrip") {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
        assert!(
            collected.windows(9).any(|w| w == b"roundtrip"),
            "expected echo from cat, got {collected:?}"
        );

        pty.close();
        assert!(pty.is_closed());
    }

    #[cfg(unix)]
    #[test]
    fn wakeup_interrupts_blocked_read() {
        let mut command = CommandBuilder::new("sleep");
        command.arg("5");
        let pty = ProcessPty::spawn(command, PageSize::new(24, 80), None).expect("spawn sleep");
        pty.wakeup_reader();
        let pool = BufferPool::new(1, 1024);
        let mut buffer = pool.acquire();
        let start = std::time::Instant::now();
        let result = pty.read(&mut buffer, Duration::from_secs(5), 1024);
        assert!(matches!(result, Ok(None)));
        assert!(start.elapsed() < Duration::from_secs(2));
        pty.close();
    }
}
