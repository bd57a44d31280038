//! Playback buffering and the speaker callback
//!
//! Inbound audio arrives in bursts from the network. The receiver task puts
//! frames on the output queue; [`PlaybackSink`] runs on the output stream's
//! real-time thread, refills the [`PlaybackBuffer`] from that queue and
//! copies exactly the requested number of samples out, padding with silence
//! on underrun.

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::buffer::{FrameQueue, SharedFrameQueue};
use crate::error::AudioError;
use crate::session::diagnostics::SessionDiagnostics;

/// What to discard when the playback buffer reaches its cap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the oldest buffered samples to make room
    #[default]
    DropOldest,
    /// Discard the incoming samples that do not fit
    DropNewest,
}

/// Result of one fill of an output slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillReport {
    /// Samples copied from the buffer
    pub delivered: usize,
    /// Samples of silence appended after them
    pub padded: usize,
}

/// Growable FIFO sample accumulator with a hard cap
pub struct PlaybackBuffer {
    samples: Mutex<VecDeque<i16>>,
    max_samples: usize,
    policy: OverflowPolicy,
    overflowed: AtomicU64,
}

impl PlaybackBuffer {
    pub fn new(max_samples: usize, policy: OverflowPolicy) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(max_samples.min(1 << 16))),
            max_samples,
            policy,
            overflowed: AtomicU64::new(0),
        }
    }

    /// Append samples at the tail
    pub fn append(&self, data: &[i16]) {
        let mut samples = self.samples.lock();
        self.append_locked(&mut samples, data);
    }

    /// Move frames from `queue` into the buffer until it holds at least
    /// `target` samples, then copy `out.len()` samples out
    ///
    /// The lock is held only for the refill and the copy. When fewer samples
    /// than requested are buffered the remainder of `out` is zeroed and the
    /// buffer is left empty.
    pub fn refill_and_drain(
        &self,
        queue: &FrameQueue,
        target: usize,
        out: &mut [i16],
    ) -> FillReport {
        let mut samples = self.samples.lock();

        while samples.len() < target {
            match queue.pop() {
                Some(frame) => self.append_locked(&mut samples, frame.samples()),
                None => break,
            }
        }

        let delivered = samples.len().min(out.len());
        for (slot, sample) in out.iter_mut().zip(samples.drain(..delivered)) {
            *slot = sample;
        }
        out[delivered..].fill(0);

        FillReport {
            delivered,
            padded: out.len() - delivered,
        }
    }

    /// Empty the buffer
    pub fn reset(&self) {
        self.samples.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    /// Samples discarded by the overflow policy
    pub fn overflowed(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }

    fn append_locked(&self, samples: &mut VecDeque<i16>, data: &[i16]) {
        match self.policy {
            OverflowPolicy::DropOldest => {
                // Only the newest max_samples of data can survive
                let data = if data.len() > self.max_samples {
                    let skipped = data.len() - self.max_samples;
                    self.overflowed.fetch_add(skipped as u64, Ordering::Relaxed);
                    &data[skipped..]
                } else {
                    data
                };
                let excess = (samples.len() + data.len()).saturating_sub(self.max_samples);
                if excess > 0 {
                    samples.drain(..excess);
                    self.overflowed.fetch_add(excess as u64, Ordering::Relaxed);
                }
                samples.extend(data.iter().copied());
            }
            OverflowPolicy::DropNewest => {
                let room = self.max_samples.saturating_sub(samples.len());
                let kept = room.min(data.len());
                samples.extend(data[..kept].iter().copied());
                let rejected = data.len() - kept;
                if rejected > 0 {
                    self.overflowed.fetch_add(rejected as u64, Ordering::Relaxed);
                }
            }
        }
    }
}

/// Consumer side of the output queue, driven by the output stream
pub struct PlaybackSink {
    queue: SharedFrameQueue,
    buffer: Arc<PlaybackBuffer>,
    sample_rate: u32,
    refill_factor: usize,
    diagnostics: Arc<SessionDiagnostics>,
    faults: Sender<AudioError>,
}

impl PlaybackSink {
    pub fn new(
        queue: SharedFrameQueue,
        buffer: Arc<PlaybackBuffer>,
        sample_rate: u32,
        refill_factor: usize,
        diagnostics: Arc<SessionDiagnostics>,
        faults: Sender<AudioError>,
    ) -> Self {
        Self {
            queue,
            buffer,
            sample_rate,
            refill_factor,
            diagnostics,
            faults,
        }
    }

    /// Fill one output slot
    ///
    /// Called on the audio subsystem's real-time thread. Always writes every
    /// sample of `out`; missing audio becomes silence.
    pub fn render(&self, out: &mut [i16]) -> FillReport {
        self.diagnostics.record_playback_callback();
        let target = out.len().saturating_mul(self.refill_factor);
        let report = self.buffer.refill_and_drain(&self.queue, target, out);
        if report.padded > 0 && !out.is_empty() {
            self.diagnostics.record_underrun(report.padded);
        }
        report
    }

    /// Record a stream fault reported by the audio subsystem
    pub fn on_stream_error(&self, message: impl Into<String>) {
        self.diagnostics.record_playback_fault();
        let _ = self.faults.try_send(AudioError::StreamError(message.into()));
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer(&self) -> &Arc<PlaybackBuffer> {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::{create_shared_queue, AudioFrame};
    use crossbeam_channel::bounded;
    use proptest::prelude::*;

    fn sink_with(buffer: Arc<PlaybackBuffer>, queue: SharedFrameQueue) -> PlaybackSink {
        let (tx, _rx) = bounded(4);
        PlaybackSink::new(queue, buffer, 24_000, 4, Arc::new(SessionDiagnostics::new()), tx)
    }

    fn ramp(len: usize) -> Vec<i16> {
        (1..=len as i16).collect()
    }

    #[test]
    fn test_underrun_pads_with_silence() {
        let buffer = Arc::new(PlaybackBuffer::new(1024, OverflowPolicy::DropOldest));
        buffer.append(&ramp(10));
        let sink = sink_with(buffer.clone(), create_shared_queue(4));

        let mut out = [i16::MIN; 16];
        let report = sink.render(&mut out);

        assert_eq!(report, FillReport { delivered: 10, padded: 6 });
        assert_eq!(&out[..10], ramp(10).as_slice());
        assert_eq!(&out[10..], &[0; 6]);
        assert!(buffer.is_empty());
        assert_eq!(sink.diagnostics.playback_underruns(), 1);
        assert_eq!(sink.diagnostics.padded_samples(), 6);
    }

    #[test]
    fn test_surplus_stays_buffered_in_order() {
        let buffer = Arc::new(PlaybackBuffer::new(1024, OverflowPolicy::DropOldest));
        buffer.append(&ramp(20));
        let sink = sink_with(buffer.clone(), create_shared_queue(4));

        let mut out = [0i16; 8];
        sink.render(&mut out);
        assert_eq!(&out, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(buffer.len(), 12);

        sink.render(&mut out);
        assert_eq!(&out, &[9, 10, 11, 12, 13, 14, 15, 16]);
        assert_eq!(sink.diagnostics.playback_underruns(), 0);
    }

    #[test]
    fn test_refill_stops_at_threshold() {
        let queue = create_shared_queue(16);
        for seq in 0..10 {
            queue.push_or_drop(AudioFrame::new(vec![seq as i16; 4], 24_000, seq));
        }
        let buffer = Arc::new(PlaybackBuffer::new(1024, OverflowPolicy::DropOldest));
        let sink = sink_with(buffer.clone(), queue.clone());

        // 2 samples requested, refill target 8 samples = 2 frames
        let mut out = [0i16; 2];
        sink.render(&mut out);

        assert_eq!(&out, &[0, 0]);
        assert_eq!(queue.len(), 8);
        assert_eq!(buffer.len(), 6);
        assert_eq!(sink.diagnostics.playback_underruns(), 0);
    }

    #[test]
    fn test_empty_buffer_and_queue_is_silence() {
        let buffer = Arc::new(PlaybackBuffer::new(64, OverflowPolicy::DropOldest));
        let sink = sink_with(buffer, create_shared_queue(4));

        let mut out = [5i16; 4];
        let report = sink.render(&mut out);
        assert_eq!(report.padded, 4);
        assert_eq!(out, [0; 4]);
    }

    #[test]
    fn test_drop_oldest_overflow() {
        let buffer = PlaybackBuffer::new(4, OverflowPolicy::DropOldest);
        buffer.append(&[1, 2, 3]);
        buffer.append(&[4, 5, 6]);

        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.overflowed(), 2);

        let mut out = [0i16; 4];
        buffer.refill_and_drain(&FrameQueue::new(1), 0, &mut out);
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn test_drop_oldest_oversized_append() {
        let buffer = PlaybackBuffer::new(3, OverflowPolicy::DropOldest);
        buffer.append(&[9]);
        buffer.append(&[1, 2, 3, 4, 5]);

        let mut out = [0i16; 3];
        buffer.refill_and_drain(&FrameQueue::new(1), 0, &mut out);
        assert_eq!(out, [3, 4, 5]);
        assert_eq!(buffer.overflowed(), 3);
    }

    #[test]
    fn test_drop_newest_overflow() {
        let buffer = PlaybackBuffer::new(4, OverflowPolicy::DropNewest);
        buffer.append(&[1, 2, 3]);
        buffer.append(&[4, 5, 6]);

        assert_eq!(buffer.overflowed(), 2);
        let mut out = [0i16; 4];
        buffer.refill_and_drain(&FrameQueue::new(1), 0, &mut out);
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_reset() {
        let buffer = PlaybackBuffer::new(16, OverflowPolicy::DropOldest);
        buffer.append(&[1, 2, 3]);
        buffer.reset();
        assert!(buffer.is_empty());
    }

    proptest! {
        #[test]
        fn prop_render_returns_exactly_n(buffered in 0usize..64, requested in 1usize..64) {
            let data = ramp(buffered);
            let buffer = Arc::new(PlaybackBuffer::new(1024, OverflowPolicy::DropOldest));
            buffer.append(&data);
            let sink = sink_with(buffer.clone(), create_shared_queue(4));

            let mut out = vec![i16::MIN; requested];
            sink.render(&mut out);

            let delivered = buffered.min(requested);
            prop_assert_eq!(&out[..delivered], &data[..delivered]);
            prop_assert!(out[delivered..].iter().all(|s| *s == 0));
            prop_assert_eq!(buffer.len(), buffered - delivered);
        }
    }
}
