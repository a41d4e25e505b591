//! Worker stdin writer task.
//!
//! Receives [`OutboundMessage`]s from an [`mpsc`] channel and sends each as
//! one JSON line through a [`FramedWrite`] over the worker's stdin. The
//! writer is the only owner of stdin, so messages reach the worker in
//! channel order.

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::worker::codec::FrameCodec;
use crate::worker::frame::OutboundMessage;
use crate::{AppError, Result};

/// Writer task: forward queued messages to `stdin`.
///
/// Exits cleanly when `cancel` fires or every sender is dropped; stdin is
/// dropped on exit, which closes the worker's input.
///
/// # Errors
///
/// - `AppError::Protocol` if a message cannot be serialised.
/// - `AppError::WorkerClosed` if writing to stdin fails (the worker exited).
pub async fn run_writer<W>(
    agent: String,
    stdin: W,
    mut msg_rx: mpsc::Receiver<OutboundMessage>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut sink = FramedWrite::new(stdin, FrameCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(agent, "worker writer: cancellation received, stopping");
                break;
            }

            msg = msg_rx.recv() => {
                let Some(message) = msg else {
                    debug!(agent, "worker writer: message channel closed, stopping");
                    break;
                };

                let line = message.to_line()?;
                trace!(agent, reset = message.is_reset(), len = line.len(), "worker writer: sending message");

                // `send` flushes, so each message is on the wire before the next is taken.
                if let Err(e) = sink.send(line).await {
                    warn!(agent, error = %e, "worker writer: write to stdin failed");
                    return Err(AppError::WorkerClosed(format!("write to {agent} failed: {e}")));
                }
            }
        }
    }

    Ok(())
}
