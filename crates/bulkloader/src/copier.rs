//! Bounded two-thread record copier
//!
//! The calling thread reads from the source into buffers taken from a free
//! queue and hands them to a dedicated writer thread over a full queue. The
//! writer drains them into the sink and returns each buffer to the free
//! queue, so memory stays bounded by the buffer pool no matter how many
//! records flow through.
//!
//! Both queues are polled with a short timeout so that either side notices
//! the `finished` flag or a fault raised by the other.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

/// Poll interval for both queues
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

const WRITER_THREAD_NAME: &str = "bulkloader-copy-writer";

#[derive(Error, Debug)]
pub enum CopyError {
    #[error("I/O error while copying: {0}")]
    Io(std::io::Error),

    #[error("copy interrupted: {0}")]
    Interrupted(String),

    #[error("copy failed: {0}")]
    Runtime(String),

    #[error("copy aborted by fatal error: {0}")]
    Fatal(String),

    #[error("buffer pool is empty")]
    EmptyBufferPool,
}

impl From<std::io::Error> for CopyError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::Interrupted => CopyError::Interrupted(err.to_string()),
            _ => CopyError::Io(err),
        }
    }
}

/// Sequential reader of typed records
pub trait RecordSource<T> {
    /// Fill `record` with the next record. Returns `false` at end of input.
    fn read_into(&mut self, record: &mut T) -> Result<bool, CopyError>;
}

/// Sequential writer of typed records
pub trait RecordSink<T>: Send {
    fn write(&mut self, record: &T) -> Result<(), CopyError>;

    fn flush(&mut self) -> Result<(), CopyError> {
        Ok(())
    }
}

/// State visible to both threads
struct Shared {
    finished: AtomicBool,
    fault: Mutex<Option<CopyError>>,
}

impl Shared {
    /// Keep the first fault only
    fn raise(&self, err: CopyError) {
        if let Ok(mut fault) = self.fault.lock() {
            if fault.is_none() {
                *fault = Some(err);
            }
        }
    }

    fn has_fault(&self) -> bool {
        self.fault.lock().map(|f| f.is_some()).unwrap_or(true)
    }

    fn take_fault(&self) -> Option<CopyError> {
        match self.fault.lock() {
            Ok(mut fault) => fault.take(),
            Err(_) => Some(CopyError::Fatal("fault holder poisoned".to_string())),
        }
    }
}

/// Copy every record of `source` into `sink`, reusing `buffers`.
///
/// Returns the number of records copied. Record order is preserved. A fault
/// on either side stops both and is returned with its original category; a
/// panic in the writer surfaces as [`CopyError::Fatal`].
pub fn copy<T, S, K>(source: &mut S, sink: &mut K, buffers: Vec<T>) -> Result<u64, CopyError>
where
    T: Send,
    S: RecordSource<T> + ?Sized,
    K: RecordSink<T> + ?Sized,
{
    if buffers.is_empty() {
        return Err(CopyError::EmptyBufferPool);
    }

    let pool_size = buffers.len();
    let (free_tx, free_rx) = sync_channel::<T>(pool_size);
    let (full_tx, full_rx) = sync_channel::<T>(pool_size);
    for buffer in buffers {
        free_tx
            .send(buffer)
            .map_err(|_| CopyError::Runtime("free queue closed before start".to_string()))?;
    }

    let shared = Shared {
        finished: AtomicBool::new(false),
        fault: Mutex::new(None),
    };
    debug!(pool_size, "Starting copy");

    let count = thread::scope(|scope| -> Result<u64, CopyError> {
        let shared = &shared;
        let writer = thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn_scoped(scope, move || write_all(sink, full_rx, free_tx, shared))?;

        let count = read_all(source, free_rx, full_tx, shared);
        shared.finished.store(true, Ordering::SeqCst);

        if let Err(payload) = writer.join() {
            let message = panic_message(payload.as_ref());
            error!(message = %message, "Copy writer panicked");
            shared.raise(CopyError::Fatal(message));
        }
        Ok(count)
    })?;

    match shared.take_fault() {
        Some(err) => {
            error!(error = %err, records = count, "Copy failed");
            Err(err)
        },
        None => {
            debug!(records = count, "Copy finished");
            Ok(count)
        },
    }
}

/// Reader side, runs on the calling thread. `full_tx` is dropped on return
/// so the writer sees the end of input even while it is blocked.
fn read_all<T, S>(source: &mut S, free_rx: Receiver<T>, full_tx: SyncSender<T>, shared: &Shared) -> u64
where
    S: RecordSource<T> + ?Sized,
{
    let mut count = 0u64;
    loop {
        if shared.has_fault() {
            break;
        }
        let mut buffer = match free_rx.recv_timeout(POLL_INTERVAL) {
            Ok(buffer) => buffer,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match source.read_into(&mut buffer) {
            Ok(true) => {
                if full_tx.send(buffer).is_err() {
                    break;
                }
                count += 1;
            },
            Ok(false) => break,
            Err(e) => {
                shared.raise(e);
                break;
            },
        }
    }
    count
}

/// Writer side, runs on the dedicated thread
fn write_all<T, K>(sink: &mut K, full_rx: Receiver<T>, free_tx: SyncSender<T>, shared: &Shared)
where
    K: RecordSink<T> + ?Sized,
{
    loop {
        match full_rx.recv_timeout(POLL_INTERVAL) {
            Ok(buffer) => {
                if let Err(e) = sink.write(&buffer) {
                    shared.raise(e);
                    return;
                }
                // the reader may already be gone
                let _ = free_tx.send(buffer);
            },
            Err(RecvTimeoutError::Timeout) => {
                if shared.has_fault() {
                    return;
                }
                if shared.finished.load(Ordering::SeqCst) {
                    break;
                }
            },
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // anything enqueued before the finished flag was observed
    while let Ok(buffer) = full_rx.try_recv() {
        if let Err(e) = sink.write(&buffer) {
            shared.raise(e);
            return;
        }
    }

    if !shared.has_fault() {
        if let Err(e) = sink.flush() {
            shared.raise(e);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
