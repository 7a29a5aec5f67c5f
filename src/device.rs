//! In-process device substrate: FIFO command streams and device buffers.
//!
//! The container dispatches bulk work as commands on a [`Stream`]. A stream
//! is a totally ordered queue: commands submitted to one stream run in
//! issue order on a dedicated worker thread, and each command fans its
//! per-key work out across the shared rayon lane pool. Distinct streams are
//! mutually unordered; callers synchronize them explicitly with
//! [`Stream::wait`].

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Sender};

use crate::error::{Error, Result};

enum Command {
    Task(Box<dyn FnOnce() + Send + 'static>),
    Fence(Sender<()>),
}

/// A FIFO command queue.
///
/// Commands enqueued on one stream execute in issue order; a command that
/// panics kills the worker, and every later submission or wait reports
/// [`Error::StreamClosed`]. Dropping the stream drains the queue and joins
/// the worker.
pub struct Stream {
    sender: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl Stream {
    /// Spawns a stream with its dedicated worker thread.
    pub fn new() -> Result<Self> {
        let (sender, receiver) = unbounded::<Command>();
        let worker = thread::Builder::new()
            .name("lanemap-stream".into())
            .spawn(move || {
                for command in receiver {
                    match command {
                        Command::Task(task) => task(),
                        Command::Fence(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
            })
            .map_err(|e| Error::Backend(format!("failed to spawn stream worker: {e}")))?;
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Enqueues a command for in-order execution.
    pub(crate) fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<()> {
        self.sender
            .as_ref()
            .expect("sender lives until drop")
            .send(Command::Task(Box::new(task)))
            .map_err(|_| Error::StreamClosed)
    }

    /// Blocks until every previously issued command has retired.
    pub fn wait(&self) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        self.sender
            .as_ref()
            .expect("sender lives until drop")
            .send(Command::Fence(ack_tx))
            .map_err(|_| Error::StreamClosed)?;
        ack_rx.recv().map_err(|_| Error::StreamClosed)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

struct RawBuffer<T> {
    cells: Box<[UnsafeCell<T>]>,
}

// SAFETY: kernels write disjoint indices (one task owns each index for the
// duration of a command) and the host only reads contents after a stream
// wait, which is the discipline every dispatcher in this crate follows.
unsafe impl<T: Send + Sync> Sync for RawBuffer<T> {}

/// An owned, device-addressable buffer.
///
/// Buffers are handed to kernels by value (cheap handle clone) and written
/// at disjoint indices by concurrent lanes. Host access goes through the
/// stream-ordered copies, mirroring explicit host/device transfers.
pub struct DeviceBuffer<T> {
    inner: Arc<RawBuffer<T>>,
}

impl<T> Clone for DeviceBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Copy + Send + Sync + 'static> DeviceBuffer<T> {
    /// Allocates a buffer holding `len` copies of `value`.
    pub fn filled(value: T, len: usize) -> Self {
        let cells = (0..len).map(|_| UnsafeCell::new(value)).collect();
        Self {
            inner: Arc::new(RawBuffer { cells }),
        }
    }

    /// Copies a host slice into a fresh buffer.
    pub fn from_slice(data: &[T]) -> Self {
        let cells = data.iter().map(|&v| UnsafeCell::new(v)).collect();
        Self {
            inner: Arc::new(RawBuffer { cells }),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.inner.cells.len()
    }

    /// Whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.inner.cells.is_empty()
    }

    /// Writes one element from a device task.
    ///
    /// # Safety
    ///
    /// `index` must be in bounds, no other task may write `index` during
    /// the current command, and the host must not read the buffer until the
    /// stream the command runs on has been waited.
    pub(crate) unsafe fn write(&self, index: usize, value: T) {
        unsafe { *self.inner.cells[index].get() = value };
    }

    /// Stream-ordered copy back to the host.
    ///
    /// Waits on `stream` first, so every command previously issued there
    /// has finished writing.
    pub fn copy_to_host(&self, out: &mut [T], stream: &Stream) -> Result<()> {
        if out.len() != self.len() {
            return Err(Error::LengthMismatch {
                input: self.len(),
                output: out.len(),
            });
        }
        stream.wait()?;
        for (slot, cell) in out.iter_mut().zip(self.inner.cells.iter()) {
            // SAFETY: the wait above fenced all writers submitted on this
            // stream, and the cells hold plain `Copy` data.
            *slot = unsafe { *cell.get() };
        }
        Ok(())
    }

    /// Stream-ordered copy into a fresh `Vec`.
    pub fn to_vec(&self, stream: &Stream) -> Result<Vec<T>> {
        stream.wait()?;
        let mut out = Vec::with_capacity(self.len());
        for cell in self.inner.cells.iter() {
            // SAFETY: the wait above fenced all writers submitted on this
            // stream.
            out.push(unsafe { *cell.get() });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn commands_run_in_issue_order() {
        let stream = Stream::new().unwrap();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..8 {
            let log = Arc::clone(&log);
            stream.submit(move || log.lock().unwrap().push(i)).unwrap();
        }
        stream.wait().unwrap();
        assert_eq!(*log.lock().unwrap(), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn wait_observes_prior_commands() {
        let stream = Stream::new().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            stream
                .submit(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
        }
        stream.wait().unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn buffer_round_trip() {
        let stream = Stream::new().unwrap();
        let buf = DeviceBuffer::from_slice(&[1u64, 2, 3]);
        assert_eq!(buf.to_vec(&stream).unwrap(), vec![1, 2, 3]);

        let out = DeviceBuffer::filled(0u64, 3);
        let writer = out.clone();
        stream
            .submit(move || {
                for i in 0..3 {
                    // SAFETY: disjoint indices, host reads after the wait
                    // inside `copy_to_host`.
                    unsafe { writer.write(i, (i as u64 + 1) * 10) };
                }
            })
            .unwrap();
        let mut host = [0u64; 3];
        out.copy_to_host(&mut host, &stream).unwrap();
        assert_eq!(host, [10, 20, 30]);
    }

    #[test]
    fn mismatched_copy_is_rejected() {
        let stream = Stream::new().unwrap();
        let buf = DeviceBuffer::from_slice(&[1u8, 2]);
        let mut out = [0u8; 3];
        assert!(matches!(
            buf.copy_to_host(&mut out, &stream),
            Err(Error::LengthMismatch { .. })
        ));
    }
}
