//! # Live Interviewer
//!
//! Full-duplex real-time voice session against a remote conversational
//! model: microphone audio streams out while synthesized speech streams back
//! and plays through the speakers.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                     HTTP control (ui::server)                         │
//! │         POST /interview   POST /stop-interview   GET /api/status      │
//! └───────────────────────────────┬──────────────────────────────────────┘
//!                                 │ start / stop
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │              Session Controller (session::controller)                 │
//! │        Idle ⇄ Running, one session at a time, teardown on stop        │
//! └───────────────────────────────┬──────────────────────────────────────┘
//!                                 │ spawns worker thread
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                  Session Worker (session::worker)                     │
//! │                                                                      │
//! │  ┌────────────┐   input    ┌────────────┐         ┌──────────────┐   │
//! │  │ Microphone │──────────▶ │ SenderTask │────────▶│              │   │
//! │  │  callback  │ FrameQueue └────────────┘         │    Remote    │   │
//! │  └────────────┘                                   │   session    │   │
//! │                                                   │  (network)   │   │
//! │  ┌────────────┐  output    ┌──────────────┐       │              │   │
//! │  │  Speaker   │◀────────── │ ReceiverTask │◀──────│              │   │
//! │  │  callback  │ FrameQueue └──────┬───────┘       └──────────────┘   │
//! │  └─────┬──────┘                   │ turn complete                    │
//! │        │                          ▼                                  │
//! │  PlaybackBuffer             TurnHook (feedback)                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The audio callbacks run on real-time threads. They never block and never
//! log; faults travel to the worker over a channel.

pub mod audio;
pub mod config;
pub mod error;
pub mod feedback;
pub mod network;
pub mod session;
pub mod ui;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Microphone sample rate expected by the remote endpoint
    pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

    /// Sample rate of synthesized speech
    pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

    /// Both streams are mono
    pub const CHANNELS: u16 = 1;

    /// Samples per capture callback
    pub const CAPTURE_BLOCK_SIZE: u32 = 1024;

    /// Samples per playback callback
    pub const PLAYBACK_BLOCK_SIZE: u32 = 2048;

    /// Input FrameQueue capacity (in frames)
    pub const INPUT_QUEUE_CAPACITY: usize = 100;

    /// Output FrameQueue capacity (in frames)
    pub const OUTPUT_QUEUE_CAPACITY: usize = 200;

    /// Playback refills up to this many callback blocks
    pub const REFILL_FACTOR: usize = 4;

    /// Ten seconds of speech at the playback rate
    pub const MAX_PLAYBACK_SAMPLES: usize = 240_000;

    pub const SEND_POLL_INTERVAL_MS: u64 = 10;

    pub const SEND_FAILURE_BACKOFF_MS: u64 = 100;

    pub const RECEIVE_RETRY_DELAY_MS: u64 = 500;

    pub const SUPERVISE_INTERVAL_MS: u64 = 50;

    pub const TASK_SHUTDOWN_GRACE_MS: u64 = 2_000;

    /// Default HTTP port for the control surface
    pub const DEFAULT_HTTP_PORT: u16 = 5000;

    pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

    pub const DEFAULT_MODEL: &str = "gemini-live-2.5-flash-preview";

    pub const DEFAULT_VOICE: &str = "Leda";

    pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a professional mock interviewer. \
        Conduct realistic, adaptive interview simulations. \
        Ask challenging and relevant questions and give feedback.";
}
