//! Remote session to output queue

use std::sync::Arc;
use std::time::Duration;

use crate::audio::buffer::{AudioFrame, SharedFrameQueue};
use crate::audio::playback::PlaybackBuffer;
use crate::feedback::{TurnEvent, TurnHook};
use crate::network::{InboundItem, LiveSession};
use crate::session::diagnostics::SessionDiagnostics;
use crate::session::signal::CancellationSignal;

/// Demultiplexes the inbound stream
///
/// Audio goes to the output queue, turn completions go to the hook. A turn
/// is reported only after every audio item received before it has been
/// enqueued.
pub struct ReceiverTask {
    session: Arc<dyn LiveSession>,
    output: SharedFrameQueue,
    playback: Arc<PlaybackBuffer>,
    hook: Arc<dyn TurnHook>,
    signal: CancellationSignal,
    diagnostics: Arc<SessionDiagnostics>,
    sample_rate: u32,
    retry_delay: Duration,
    enqueue_wait: Duration,
}

impl ReceiverTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Arc<dyn LiveSession>,
        output: SharedFrameQueue,
        playback: Arc<PlaybackBuffer>,
        hook: Arc<dyn TurnHook>,
        signal: CancellationSignal,
        diagnostics: Arc<SessionDiagnostics>,
        sample_rate: u32,
        retry_delay: Duration,
        enqueue_wait: Duration,
    ) -> Self {
        Self {
            session,
            output,
            playback,
            hook,
            signal,
            diagnostics,
            sample_rate,
            retry_delay,
            enqueue_wait,
        }
    }

    pub async fn run(self) {
        tracing::debug!("Receiver task started");

        let mut turn = 0u64;
        let mut transcript = String::new();
        let mut sequence = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.signal.cancelled() => break,
                next = self.session.receive() => next,
            };

            if matches!(next, Ok(Some(_))) && self.diagnostics.remote_ended() {
                self.diagnostics.set_remote_ended(false);
                tracing::info!("Receive stream resumed");
            }

            match next {
                Ok(Some(InboundItem::Audio(data))) => {
                    let frame = AudioFrame::from_le_bytes(&data, self.sample_rate, sequence);
                    if frame.is_empty() {
                        continue;
                    }
                    sequence += 1;
                    self.diagnostics.record_frame_received();
                    if !self.enqueue(frame).await {
                        break;
                    }
                }
                Ok(Some(InboundItem::InputTranscript(text))) => {
                    transcript.push_str(&text);
                }
                Ok(Some(InboundItem::Interrupted)) => {
                    self.diagnostics.record_interruption();
                    let discarded = self.output.clear();
                    self.playback.reset();
                    tracing::info!(discarded, "Model interrupted, pending speech discarded");
                }
                Ok(Some(InboundItem::TurnComplete)) => {
                    turn += 1;
                    self.diagnostics.record_turn_completed();
                    let text = std::mem::take(&mut transcript);
                    let event = TurnEvent {
                        turn,
                        transcript: (!text.trim().is_empty()).then_some(text),
                    };
                    tracing::info!(turn, "Turn complete");
                    self.hook.on_turn_complete(&event);
                }
                Ok(None) => {
                    self.diagnostics.record_receive_restart();
                    if self.diagnostics.remote_ended() {
                        tracing::debug!("Receive stream still ended");
                    } else {
                        self.diagnostics.set_remote_ended(true);
                        tracing::warn!(
                            "Receive stream ended, retrying every {:?}",
                            self.retry_delay
                        );
                    }
                    if !self.signal.sleep(self.retry_delay).await {
                        break;
                    }
                }
                Err(e) => {
                    self.diagnostics.record_receive_error();
                    tracing::warn!("Receive failed: {}, retrying in {:?}", e, self.retry_delay);
                    if !self.signal.sleep(self.retry_delay).await {
                        break;
                    }
                }
            }
        }

        tracing::debug!(turns = turn, "Receiver task stopped");
    }

    /// Wait for room in the output queue
    /// Returns false if cancelled first; the frame is then discarded
    async fn enqueue(&self, mut frame: AudioFrame) -> bool {
        loop {
            match self.output.try_push(frame) {
                Ok(()) => return true,
                Err(rejected) => {
                    frame = rejected;
                    if !self.signal.sleep(self.enqueue_wait).await {
                        return false;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::create_shared_queue;
    use crate::audio::playback::OverflowPolicy;
    use crate::error::RemoteError;
    use crate::test_support::{eventually, RecordingHook, ScriptedSession, Step};
    use bytes::Bytes;

    struct Harness {
        output: SharedFrameQueue,
        playback: Arc<PlaybackBuffer>,
        hook: Arc<RecordingHook>,
        signal: CancellationSignal,
        diagnostics: Arc<SessionDiagnostics>,
    }

    impl Harness {
        fn new(output_capacity: usize) -> Self {
            Self {
                output: create_shared_queue(output_capacity),
                playback: Arc::new(PlaybackBuffer::new(1024, OverflowPolicy::DropOldest)),
                hook: RecordingHook::new(),
                signal: CancellationSignal::new(),
                diagnostics: Arc::new(SessionDiagnostics::new()),
            }
        }

        fn spawn(&self, session: Arc<ScriptedSession>) -> tokio::task::JoinHandle<()> {
            let task = ReceiverTask::new(
                session,
                self.output.clone(),
                self.playback.clone(),
                self.hook.clone(),
                self.signal.clone(),
                self.diagnostics.clone(),
                24_000,
                Duration::from_millis(10),
                Duration::from_millis(5),
            );
            tokio::spawn(task.run())
        }
    }

    fn audio(bytes: &'static [u8]) -> InboundItem {
        InboundItem::Audio(Bytes::from_static(bytes))
    }

    #[tokio::test]
    async fn test_audio_then_turn_complete() {
        let h = Harness::new(8);
        let session = ScriptedSession::items(vec![
            audio(&[1, 0, 2, 0]),
            InboundItem::InputTranscript("I wrote ".into()),
            audio(&[3, 0, 9]),
            InboundItem::InputTranscript("the parser".into()),
            InboundItem::TurnComplete,
            InboundItem::TurnComplete,
        ]);
        let handle = h.spawn(session);

        assert!(eventually(Duration::from_secs(2), || h.hook.events().len() == 2).await);
        h.signal.cancel();
        handle.await.unwrap();

        let first = h.output.pop().unwrap();
        assert_eq!(first.samples(), &[1, 2]);
        assert_eq!(first.sample_rate(), 24_000);
        // Odd trailing byte dropped
        assert_eq!(h.output.pop().unwrap().samples(), &[3]);
        assert!(h.output.is_empty());

        let events = h.hook.events();
        assert_eq!(events[0].turn, 1);
        assert_eq!(events[0].transcript.as_deref(), Some("I wrote the parser"));
        assert_eq!(events[1].turn, 2);
        assert_eq!(events[1].transcript, None);
        assert_eq!(h.diagnostics.turns_completed(), 2);
    }

    #[tokio::test]
    async fn test_interruption_discards_pending_speech() {
        let h = Harness::new(8);
        h.playback.append(&[5; 100]);
        let session = ScriptedSession::items(vec![
            audio(&[1, 0]),
            audio(&[2, 0]),
            InboundItem::Interrupted,
            audio(&[3, 0]),
        ]);
        let handle = h.spawn(session);

        assert!(eventually(Duration::from_secs(2), || h.diagnostics.frames_received() == 3).await);
        h.signal.cancel();
        handle.await.unwrap();

        assert!(h.playback.is_empty());
        assert_eq!(h.output.len(), 1);
        assert_eq!(h.output.pop().unwrap().samples(), &[3]);
        assert_eq!(h.diagnostics.interruptions(), 1);
    }

    #[tokio::test]
    async fn test_stream_end_and_errors_are_retried() {
        let h = Harness::new(8);
        let session = ScriptedSession::new(vec![
            Step::End,
            Step::Fail(RemoteError::ReceiveFailed("reset by peer".into())),
            Step::Item(InboundItem::TurnComplete),
        ]);
        let handle = h.spawn(session.clone());

        assert!(eventually(Duration::from_secs(2), || h.hook.events().len() == 1).await);
        h.signal.cancel();
        handle.await.unwrap();

        assert_eq!(h.diagnostics.receive_restarts(), 1);
        assert_eq!(h.diagnostics.receive_errors(), 1);
        assert!(session.receive_calls() >= 3);
        assert!(!h.diagnostics.remote_ended());
    }

    #[tokio::test]
    async fn test_remote_flag_clears_when_items_resume() {
        let h = Harness::new(8);
        let session = ScriptedSession::new(vec![
            Step::End,
            Step::End,
            Step::End,
            Step::Item(audio(&[4, 0])),
        ]);
        let handle = h.spawn(session.clone());

        assert!(eventually(Duration::from_secs(2), || h.diagnostics.frames_received() == 1).await);
        h.signal.cancel();
        handle.await.unwrap();

        assert_eq!(h.diagnostics.receive_restarts(), 3);
        assert!(!h.diagnostics.remote_ended());
    }

    #[tokio::test]
    async fn test_remote_stays_flagged_while_ended() {
        let h = Harness::new(8);
        let session = ScriptedSession::new(vec![Step::End, Step::End]);
        let handle = h.spawn(session.clone());

        assert!(eventually(Duration::from_secs(2), || h.diagnostics.receive_restarts() == 2).await);
        h.signal.cancel();
        handle.await.unwrap();

        assert!(h.diagnostics.remote_ended());
    }

    #[tokio::test]
    async fn test_full_output_queue_blocks_until_drained() {
        let h = Harness::new(1);
        let session = ScriptedSession::items(vec![
            audio(&[1, 0]),
            audio(&[2, 0]),
            InboundItem::TurnComplete,
        ]);
        let handle = h.spawn(session);

        assert!(eventually(Duration::from_secs(2), || h.output.is_full()).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Second frame is still waiting, so the turn cannot have completed
        assert!(h.hook.events().is_empty());

        assert_eq!(h.output.pop().unwrap().samples(), &[1]);
        assert!(eventually(Duration::from_secs(2), || h.hook.events().len() == 1).await);
        assert_eq!(h.output.pop().unwrap().samples(), &[2]);
        assert_eq!(h.output.stats().dropped, 0);

        h.signal.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_room() {
        let h = Harness::new(1);
        let session = ScriptedSession::items(vec![audio(&[1, 0]), audio(&[2, 0])]);
        let handle = h.spawn(session);

        assert!(eventually(Duration::from_secs(2), || h.output.is_full()).await);
        h.signal.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("receiver did not observe cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_while_receiving() {
        let h = Harness::new(4);
        let session = ScriptedSession::new(Vec::new());
        let handle = h.spawn(session.clone());

        assert!(eventually(Duration::from_secs(2), || session.receive_calls() == 1).await);
        h.signal.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("receiver did not observe cancellation")
            .unwrap();
    }
}
