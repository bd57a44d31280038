//! Per-session counters
//!
//! Real-time callbacks and background tasks never surface faults to a
//! caller. They bump these counters instead, which the status endpoint and
//! the tests read back.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::audio::buffer::QueueStats;

#[derive(Debug, Default)]
pub struct SessionDiagnostics {
    capture_blocks: AtomicU64,
    capture_faults: AtomicU64,
    playback_callbacks: AtomicU64,
    playback_underruns: AtomicU64,
    padded_samples: AtomicU64,
    playback_faults: AtomicU64,
    frames_sent: AtomicU64,
    send_failures: AtomicU64,
    frames_received: AtomicU64,
    turns_completed: AtomicU64,
    receive_restarts: AtomicU64,
    receive_errors: AtomicU64,
    interruptions: AtomicU64,
    remote_ended: AtomicBool,
}

macro_rules! counter {
    ($record:ident, $get:ident, $field:ident) => {
        pub fn $record(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }

        pub fn $get(&self) -> u64 {
            self.$field.load(Ordering::Relaxed)
        }
    };
}

impl SessionDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_capture_block, capture_blocks, capture_blocks);
    counter!(record_capture_fault, capture_faults, capture_faults);
    counter!(record_playback_callback, playback_callbacks, playback_callbacks);
    counter!(record_playback_fault, playback_faults, playback_faults);
    counter!(record_frame_sent, frames_sent, frames_sent);
    counter!(record_send_failure, send_failures, send_failures);
    counter!(record_frame_received, frames_received, frames_received);
    counter!(record_turn_completed, turns_completed, turns_completed);
    counter!(record_receive_restart, receive_restarts, receive_restarts);
    counter!(record_receive_error, receive_errors, receive_errors);
    counter!(record_interruption, interruptions, interruptions);

    /// Record a playback callback that had to pad `padded` samples of silence
    pub fn record_underrun(&self, padded: usize) {
        self.playback_underruns.fetch_add(1, Ordering::Relaxed);
        self.padded_samples.fetch_add(padded as u64, Ordering::Relaxed);
    }

    pub fn playback_underruns(&self) -> u64 {
        self.playback_underruns.load(Ordering::Relaxed)
    }

    pub fn padded_samples(&self) -> u64 {
        self.padded_samples.load(Ordering::Relaxed)
    }

    /// Whether the inbound stream is currently ended
    ///
    /// Set when a receive reports end of stream, cleared by the next item.
    pub fn set_remote_ended(&self, ended: bool) {
        self.remote_ended.store(ended, Ordering::Relaxed);
    }

    pub fn remote_ended(&self) -> bool {
        self.remote_ended.load(Ordering::Relaxed)
    }

    /// Snapshot every counter together with the queue and buffer state
    pub fn snapshot(
        &self,
        input: QueueStats,
        output: QueueStats,
        playback_buffered: usize,
        playback_overflowed: u64,
    ) -> SessionStats {
        SessionStats {
            capture_blocks: self.capture_blocks(),
            capture_faults: self.capture_faults(),
            playback_callbacks: self.playback_callbacks(),
            playback_underruns: self.playback_underruns(),
            padded_samples: self.padded_samples(),
            playback_faults: self.playback_faults(),
            frames_sent: self.frames_sent(),
            send_failures: self.send_failures(),
            frames_received: self.frames_received(),
            turns_completed: self.turns_completed(),
            receive_restarts: self.receive_restarts(),
            receive_errors: self.receive_errors(),
            interruptions: self.interruptions(),
            remote_ended: self.remote_ended(),
            input_queue: input,
            output_queue: output,
            playback_buffered,
            playback_overflowed,
        }
    }
}

/// Serializable view of a session's counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub capture_blocks: u64,
    pub capture_faults: u64,
    pub playback_callbacks: u64,
    pub playback_underruns: u64,
    pub padded_samples: u64,
    pub playback_faults: u64,
    pub frames_sent: u64,
    pub send_failures: u64,
    pub frames_received: u64,
    pub turns_completed: u64,
    pub receive_restarts: u64,
    pub receive_errors: u64,
    pub interruptions: u64,
    pub remote_ended: bool,
    pub input_queue: QueueStats,
    pub output_queue: QueueStats,
    pub playback_buffered: usize,
    pub playback_overflowed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let diag = SessionDiagnostics::new();
        diag.record_frame_sent();
        diag.record_frame_sent();
        diag.record_underrun(6);
        diag.record_underrun(10);

        let stats = diag.snapshot(QueueStats::default(), QueueStats::default(), 3, 0);
        assert_eq!(stats.frames_sent, 2);
        assert_eq!(stats.playback_underruns, 2);
        assert_eq!(stats.padded_samples, 16);
        assert_eq!(stats.playback_buffered, 3);
        assert!(!stats.remote_ended);
    }

    #[test]
    fn test_remote_ended_flag() {
        let diag = SessionDiagnostics::new();
        diag.set_remote_ended(true);
        assert!(diag.snapshot(QueueStats::default(), QueueStats::default(), 0, 0).remote_ended);

        diag.set_remote_ended(false);
        assert!(!diag.remote_ended());
    }
}
