//! Worker stdout reader task.
//!
//! Frames the worker's stdout with [`FrameCodec`], classifies each line as
//! an [`InboundFrame`], and feeds it to the worker's [`Correlator`]. When a
//! completion frame matches the pending task, the conversational reset is
//! queued on the writer channel before the waiting task is woken, so the
//! reset always precedes the next task on the worker's stdin.
//!
//! Lines that are not JSON, or JSON without a completion marker, are
//! expected (workers interleave human-readable progress) and are skipped.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::worker::codec::FrameCodec;
use crate::worker::correlator::{Correlator, FrameDisposition};
use crate::worker::frame::{InboundFrame, OutboundMessage};
use crate::AppError;

/// Why the reader stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderExit {
    /// Cancellation token fired (eviction or shutdown).
    Cancelled,
    /// The worker closed its stdout.
    Eof,
    /// Reading stdout failed.
    Failed(String),
}

/// Reader task: drive `stdout` until EOF, failure, or cancellation.
///
/// On EOF or failure a pending task is rejected with
/// `AppError::WorkerClosed` and the worker is marked dead.
pub async fn run_reader<R>(
    agent: String,
    stdout: R,
    correlator: Arc<Mutex<Correlator>>,
    outbound: mpsc::Sender<OutboundMessage>,
    cancel: CancellationToken,
) -> ReaderExit
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, FrameCodec::new());
    // FramedRead yields one `None` after a decode error before it resumes.
    let mut resume_after_error = false;

    let exit = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(agent, "worker reader: cancellation received, stopping");
                break ReaderExit::Cancelled;
            }

            item = framed.next() => {
                match item {
                    None if resume_after_error => {
                        resume_after_error = false;
                    }

                    None => {
                        debug!(agent, "worker reader: EOF detected");
                        break ReaderExit::Eof;
                    }

                    Some(Err(AppError::Protocol(ref msg))) => {
                        warn!(agent, error = msg.as_str(), "worker reader: framing error, skipping line");
                        resume_after_error = true;
                    }

                    Some(Err(e)) => {
                        warn!(agent, error = %e, "worker reader: IO error, stopping");
                        break ReaderExit::Failed(e.to_string());
                    }

                    Some(Ok(line)) => {
                        resume_after_error = false;
                        if line.trim().is_empty() {
                            continue;
                        }
                        handle_line(&agent, &line, &correlator, &outbound).await;
                    }
                }
            }
        }
    };

    let reason = match &exit {
        ReaderExit::Cancelled => None,
        ReaderExit::Eof => Some("process closed".to_owned()),
        ReaderExit::Failed(err) => Some(format!("stdout read failed: {err}")),
    };
    if let Some(reason) = reason {
        if correlator.lock().await.close(&reason) {
            warn!(agent, %reason, "worker reader: rejected pending task");
        }
    }

    exit
}

async fn handle_line(
    agent: &str,
    line: &str,
    correlator: &Mutex<Correlator>,
    outbound: &mpsc::Sender<OutboundMessage>,
) {
    let frame = InboundFrame::decode(line);
    if let InboundFrame::Progress { ref kind } = frame {
        trace!(agent, kind = kind.as_str(), "worker reader: progress frame");
    }

    let disposition = correlator.lock().await.on_frame(frame);
    match disposition {
        FrameDisposition::Completed(completion) => {
            debug!(agent, task_id = completion.task_id, "worker reader: task completed");
            if outbound.send(OutboundMessage::reset()).await.is_err() {
                warn!(agent, "worker reader: writer closed, context reset not sent");
            }
            completion.deliver();
        }
        FrameDisposition::LateDiscarded => {
            debug!(agent, "worker reader: late completion frame absorbed");
        }
        FrameDisposition::Unsolicited => {
            debug!(agent, "worker reader: unsolicited completion frame discarded");
        }
        FrameDisposition::Ignored => {}
    }
}
