//! Output reading logic for local sessions

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::transport::framing::{FramedOutput, StreamKind};

use super::ExitReporter;
use super::session::{CaptureSlot, SharedSlot};

const READ_CHUNK_SIZE: usize = 8192;

/// How long a command whose stdout has ended waits for its stderr sentinel
const STDERR_GRACE: Duration = Duration::from_millis(50);

/// Spawn a task feeding one interpreter stream into the shared framer
///
/// Chunks are handed over exactly as read; sentinel reassembly is the
/// framer's job. On end of stream the slot is marked closed, any waiting
/// command is released, and (stdout only) an exit notice is sent unless the
/// session is being closed on purpose.
pub(super) fn spawn_stream_reader<R>(
    mut reader: R,
    stream: StreamKind,
    slot: SharedSlot,
    closing: Arc<AtomicBool>,
    exit: Option<ExitReporter>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = vec![0u8; READ_CHUNK_SIZE];

        loop {
            match reader.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => {
                    let mut guard = slot.lock();
                    let pending_before = guard.framer.stderr_pending();
                    match guard.framer.feed(stream, &buffer[..n]) {
                        Some(output) => deliver(&mut guard, output),
                        None => {
                            if pending_before.is_none()
                                && let Some(id) = guard.framer.stderr_pending()
                            {
                                let slot = Arc::clone(&slot);
                                tokio::spawn(async move {
                                    tokio::time::sleep(STDERR_GRACE).await;
                                    let mut guard = slot.lock();
                                    if let Some(output) = guard.framer.finish(id) {
                                        log::debug!("Command {id} completed without its stderr sentinel");
                                        deliver(&mut guard, output);
                                    }
                                });
                            }
                        }
                    }
                }
                Err(e) => {
                    log::debug!("{stream:?} read error: {e}");
                    break;
                }
            }
        }

        if stream == StreamKind::Stdout {
            {
                let mut guard = slot.lock();
                guard.closed = true;
                // Dropping the sender rejects an in-flight execute right away
                guard.waiter = None;
            }
            if !closing.load(Ordering::SeqCst)
                && let Some(exit) = exit
            {
                log::warn!("[{}] interpreter exited unexpectedly", exit.notice.name);
                exit.report();
            }
        }
    })
}

/// Hand a completed capture to the waiting `execute`, if it is still waiting
fn deliver(slot: &mut CaptureSlot, output: FramedOutput) {
    match slot.waiter.take() {
        Some((id, tx)) if id == output.id => {
            // Receiver dropped means the caller timed out meanwhile
            let _ = tx.send(output);
        }
        other => {
            log::debug!("Discarding output of command {} with no waiter", output.id);
            slot.waiter = other;
        }
    }
}
