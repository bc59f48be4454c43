//! Byte-source abstraction and the adaptive reader thread.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::Sender;
use tracing::{debug, error, trace};

/// Chunk size for batched reads once data is flowing.
pub const BLOCK_SIZE: usize = 64;

/// Timeout for block reads while data is flowing. Short enough that a
/// trailing partial command renders promptly.
const BURST_TIMEOUT: Duration = Duration::from_millis(100);

/// Re-poll interval while idle. The read blocks for this long per attempt
/// so the reader stays responsive to the stop flag.
const IDLE_TIMEOUT: Duration = Duration::from_millis(500);

/// A timeout-capable byte stream. Implementations wrap a serial port in
/// production and a scripted buffer in tests.
pub trait ByteSource: Send {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Read up to `buf.len()` bytes. `Ok(0)` means the timeout elapsed with
    /// no data; an error is a failed or exhausted source.
    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// What the reader thread sends to the capture loop.
#[derive(Debug)]
pub enum SourceEvent {
    Data(Vec<u8>),
    Failed(io::Error),
}

/// Spawn the adaptive reader: block for a single byte while the line is
/// quiet, switch to short-timeout block reads while bytes are flowing, and
/// drop back to single-byte mode whenever a block read comes up short.
pub(crate) fn spawn_reader(
    mut source: Box<dyn ByteSource>,
    tx: Sender<SourceEvent>,
    stop: Arc<AtomicBool>,
) -> io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("capture-reader".to_string())
        .spawn(move || {
            let mut buf = [0u8; BLOCK_SIZE];
            let mut burst = false;
            if let Err(e) = source.set_timeout(IDLE_TIMEOUT) {
                let _ = tx.blocking_send(SourceEvent::Failed(e));
                return;
            }
            loop {
                if stop.load(Ordering::Relaxed) {
                    debug!(target: "capture.reader", "stop_requested");
                    return;
                }
                let read = if burst {
                    source.read_some(&mut buf)
                } else {
                    source.read_some(&mut buf[..1])
                };
                match read {
                    Ok(0) => {
                        if burst {
                            burst = false;
                            if let Err(e) = source.set_timeout(IDLE_TIMEOUT) {
                                let _ = tx.blocking_send(SourceEvent::Failed(e));
                                return;
                            }
                        }
                    }
                    Ok(n) => {
                        trace!(target: "capture.reader", bytes = n, burst, "chunk");
                        if tx
                            .blocking_send(SourceEvent::Data(buf[..n].to_vec()))
                            .is_err()
                        {
                            // Consumer is gone; nothing left to do.
                            return;
                        }
                        let want_burst = !burst || n == BLOCK_SIZE;
                        if want_burst != burst {
                            burst = want_burst;
                            let timeout = if burst { BURST_TIMEOUT } else { IDLE_TIMEOUT };
                            if let Err(e) = source.set_timeout(timeout) {
                                let _ = tx.blocking_send(SourceEvent::Failed(e));
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        error!(target: "capture.reader", error = %e, "read_failed");
                        let _ = tx.blocking_send(SourceEvent::Failed(e));
                        return;
                    }
                }
            }
        })
}
