//! Audio frames and the bounded queues that connect pipeline stages
//!
//! A [`FrameQueue`] is a lock-free multi-producer multi-consumer FIFO with a
//! fixed capacity. Real-time callbacks use it without blocking: the capture
//! side drops the newest frame when the queue is full, the playback side
//! drains whatever is available.

use bytes::{BufMut, Bytes, BytesMut};
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Immutable block of mono 16-bit PCM samples
///
/// Samples live behind an `Arc`, so handing a frame from producer to queue to
/// consumer never copies the audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Arc<[i16]>,
    sample_rate: u32,
    sequence: u64,
}

impl AudioFrame {
    pub fn new(samples: impl Into<Arc<[i16]>>, sample_rate: u32, sequence: u64) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            sequence,
        }
    }

    /// Build a frame from little-endian PCM bytes
    ///
    /// A trailing odd byte cannot form a sample and is ignored.
    pub fn from_le_bytes(data: &[u8], sample_rate: u32, sequence: u64) -> Self {
        let samples: Vec<i16> = data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::new(samples, sample_rate, sequence)
    }

    /// Encode the samples as little-endian PCM bytes
    pub fn to_le_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.samples.len() * 2);
        for sample in self.samples.iter() {
            out.put_i16_le(*sample);
        }
        out.freeze()
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get frame duration in microseconds
    pub fn duration_us(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1_000_000) / self.sample_rate as u64
    }
}

/// Bounded FIFO of audio frames
pub struct FrameQueue {
    queue: ArrayQueue<AudioFrame>,
    admitted: AtomicU64,
    dropped: AtomicU64,
}

impl FrameQueue {
    /// Create a new queue holding at most `capacity` frames
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            admitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Try to enqueue a frame, handing it back if the queue is full
    ///
    /// A rejected frame is not counted as dropped; the caller decides what
    /// to do with it.
    pub fn try_push(&self, frame: AudioFrame) -> Result<(), AudioFrame> {
        self.queue.push(frame)?;
        self.admitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Enqueue a frame or drop it when the queue is full
    /// Returns false if the frame was dropped
    pub fn push_or_drop(&self, frame: AudioFrame) -> bool {
        match self.try_push(frame) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Dequeue the oldest frame
    pub fn pop(&self) -> Option<AudioFrame> {
        self.queue.pop()
    }

    /// Discard every queued frame, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        while self.queue.pop().is_some() {
            removed += 1;
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Frames dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            len: self.len(),
            capacity: self.capacity(),
            admitted: self.admitted.load(Ordering::Relaxed),
            dropped: self.dropped(),
        }
    }
}

/// Thread-safe handle to a frame queue
pub type SharedFrameQueue = Arc<FrameQueue>;

/// Create a new shared frame queue
pub fn create_shared_queue(capacity: usize) -> SharedFrameQueue {
    Arc::new(FrameQueue::new(capacity))
}

/// Frame queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    pub len: usize,
    pub capacity: usize,
    pub admitted: u64,
    pub dropped: u64,
}
