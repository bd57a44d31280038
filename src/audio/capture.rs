//! Microphone capture
//!
//! [`CaptureSource`] is the body of the input stream's real-time callback.
//! Each block is copied into an [`AudioFrame`] and offered to the input
//! queue without blocking; when the queue is full the block is dropped.

use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::buffer::{AudioFrame, SharedFrameQueue};
use crate::error::AudioError;
use crate::session::diagnostics::SessionDiagnostics;

/// Producer side of the input queue
pub struct CaptureSource {
    /// Queue drained by the sender task
    queue: SharedFrameQueue,

    /// Sample rate the stream was opened with
    sample_rate: u32,

    /// Next frame sequence number
    sequence: AtomicU64,

    /// Session counters
    diagnostics: Arc<SessionDiagnostics>,

    /// Faults forwarded to the supervisory loop for logging
    faults: Sender<AudioError>,
}

impl CaptureSource {
    pub fn new(
        queue: SharedFrameQueue,
        sample_rate: u32,
        diagnostics: Arc<SessionDiagnostics>,
        faults: Sender<AudioError>,
    ) -> Self {
        Self {
            queue,
            sample_rate,
            sequence: AtomicU64::new(0),
            diagnostics,
            faults,
        }
    }

    /// Handle one block of captured samples
    ///
    /// Called on the audio subsystem's real-time thread. Never blocks and
    /// never logs; a full queue drops the block.
    pub fn on_block(&self, data: &[i16]) {
        self.diagnostics.record_capture_block();
        if data.is_empty() {
            return;
        }

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = AudioFrame::new(data, self.sample_rate, seq);

        // Full queue counts the drop inside the queue
        let _ = self.queue.push_or_drop(frame);
    }

    /// Record a stream fault reported by the audio subsystem
    pub fn on_stream_error(&self, message: impl Into<String>) {
        self.diagnostics.record_capture_fault();
        let _ = self.faults.try_send(AudioError::StreamError(message.into()));
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames built from non-empty blocks so far
    pub fn blocks_captured(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Blocks lost because the input queue was full
    pub fn blocks_dropped(&self) -> u64 {
        self.queue.dropped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::create_shared_queue;
    use crossbeam_channel::bounded;

    fn source(
        capacity: usize,
    ) -> (
        CaptureSource,
        SharedFrameQueue,
        crossbeam_channel::Receiver<AudioError>,
    ) {
        let queue = create_shared_queue(capacity);
        let (tx, rx) = bounded(4);
        let source = CaptureSource::new(
            queue.clone(),
            16_000,
            Arc::new(SessionDiagnostics::new()),
            tx,
        );
        (source, queue, rx)
    }

    #[test]
    fn test_blocks_become_frames_in_order() {
        let (source, queue, _rx) = source(4);

        source.on_block(&[1, 2, 3]);
        source.on_block(&[4, 5]);

        let first = queue.pop().unwrap();
        assert_eq!(first.samples(), &[1, 2, 3]);
        assert_eq!(first.sample_rate(), 16_000);
        assert_eq!(first.sequence(), 0);
        assert_eq!(queue.pop().unwrap().samples(), &[4, 5]);
    }

    #[test]
    fn test_full_queue_drops_block() {
        let (source, queue, _rx) = source(2);

        source.on_block(&[1]);
        source.on_block(&[2]);
        source.on_block(&[3]);

        assert_eq!(queue.len(), 2);
        assert_eq!(source.blocks_dropped(), 1);
        assert_eq!(source.blocks_captured(), 3);
        assert_eq!(queue.pop().unwrap().samples(), &[1]);
        assert_eq!(queue.pop().unwrap().samples(), &[2]);
    }

    #[test]
    fn test_stream_errors_are_counted_and_forwarded() {
        let (source, _queue, rx) = source(2);

        source.on_stream_error("input overflow");

        assert_eq!(source.diagnostics.capture_faults(), 1);
        assert!(
            matches!(rx.try_recv(), Ok(AudioError::StreamError(msg)) if msg == "input overflow")
        );
    }

    #[test]
    fn test_fault_channel_full_does_not_block() {
        let (source, _queue, _rx) = source(2);
        for _ in 0..16 {
            source.on_stream_error("glitch");
        }
        assert_eq!(source.diagnostics.capture_faults(), 16);
    }
}
