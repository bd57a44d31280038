//! Input queue to remote session

use std::sync::Arc;
use std::time::Duration;

use crate::audio::buffer::SharedFrameQueue;
use crate::network::{AudioBlob, LiveSession};
use crate::session::diagnostics::SessionDiagnostics;
use crate::session::signal::CancellationSignal;

/// Drains the input queue and transmits each frame as tagged PCM
pub struct SenderTask {
    queue: SharedFrameQueue,
    session: Arc<dyn LiveSession>,
    signal: CancellationSignal,
    diagnostics: Arc<SessionDiagnostics>,
    poll_interval: Duration,
    failure_backoff: Duration,
}

impl SenderTask {
    pub fn new(
        queue: SharedFrameQueue,
        session: Arc<dyn LiveSession>,
        signal: CancellationSignal,
        diagnostics: Arc<SessionDiagnostics>,
        poll_interval: Duration,
        failure_backoff: Duration,
    ) -> Self {
        Self {
            queue,
            session,
            signal,
            diagnostics,
            poll_interval,
            failure_backoff,
        }
    }

    /// Run until the signal is set
    ///
    /// A failed transmit drops that frame; the loop carries on after a short
    /// backoff. Cancellation cuts both the idle wait and an in-flight send.
    /// Only the first failure of a streak is logged as a warning.
    pub async fn run(self) {
        tracing::debug!("Sender task started");

        let mut failing = 0u64;

        while !self.signal.is_cancelled() {
            let Some(frame) = self.queue.pop() else {
                if !self.signal.sleep(self.poll_interval).await {
                    break;
                }
                continue;
            };

            let sequence = frame.sequence();
            let blob = AudioBlob::pcm(&frame);
            let result = tokio::select! {
                biased;
                _ = self.signal.cancelled() => break,
                result = self.session.send_audio(blob) => result,
            };

            match result {
                Ok(()) => {
                    self.diagnostics.record_frame_sent();
                    if failing > 0 {
                        tracing::info!(failed = failing, "Sending recovered");
                        failing = 0;
                    }
                }
                Err(e) => {
                    self.diagnostics.record_send_failure();
                    failing += 1;
                    if failing == 1 {
                        tracing::warn!(sequence, "Failed to send audio frame: {}", e);
                    } else {
                        tracing::debug!(
                            sequence,
                            failed = failing,
                            "Failed to send audio frame: {}",
                            e
                        );
                    }
                    if !self.signal.sleep(self.failure_backoff).await {
                        break;
                    }
                }
            }
        }

        tracing::debug!(sent = self.diagnostics.frames_sent(), "Sender task stopped");
    }
}
