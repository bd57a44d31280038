//! Connection to the remote conversational streaming endpoint
//!
//! The session talks to the endpoint only through [`LiveConnector`] and
//! [`LiveSession`]. [`gemini`] implements them over a WebSocket; tests use a
//! scripted session.

pub mod gemini;
pub mod protocol;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::audio::buffer::AudioFrame;
use crate::config::RemoteConfig;
use crate::error::RemoteError;

pub use gemini::GeminiLiveConnector;

/// Raw PCM payload with its format tag
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlob {
    pub data: Bytes,
    pub mime_type: String,
}

impl AudioBlob {
    /// Little-endian 16-bit PCM tagged with the frame's sample rate
    pub fn pcm(frame: &AudioFrame) -> Self {
        Self {
            data: frame.to_le_bytes(),
            mime_type: pcm_mime_type(frame.sample_rate()),
        }
    }
}

pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// One item of the inbound stream, in receive order
#[derive(Debug, Clone, PartialEq)]
pub enum InboundItem {
    /// Synthesized speech, little-endian 16-bit PCM
    Audio(Bytes),
    /// Fragment of the transcription of the user's speech
    InputTranscript(String),
    /// The user talked over the model; pending model audio is stale
    Interrupted,
    /// The model finished its turn
    TurnComplete,
}

/// Everything needed to open a session
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSetup {
    pub model: String,
    pub response_modality: String,
    pub voice_name: String,
    pub system_instruction: String,
    pub transcribe_input: bool,
}

impl LiveSetup {
    /// Setup for an interview about `job_description`
    ///
    /// The configured base instruction is extended per session; the shared
    /// configuration is left untouched.
    pub fn for_interview(remote: &RemoteConfig, job_description: &str) -> Self {
        Self {
            model: remote.model.clone(),
            response_modality: remote.response_modality.clone(),
            voice_name: remote.voice.clone(),
            system_instruction: format!(
                "{} Use the following Job Description (JD) as context:\n{}",
                remote.system_instruction, job_description
            ),
            transcribe_input: remote.transcribe_input,
        }
    }
}

/// Opens sessions against the remote endpoint
#[async_trait]
pub trait LiveConnector: Send + Sync {
    async fn connect(&self, setup: &LiveSetup) -> Result<Arc<dyn LiveSession>, RemoteError>;
}

/// An open duplex session
///
/// `send_audio` and `receive` are called concurrently from the sender and
/// receiver tasks.
#[async_trait]
pub trait LiveSession: Send + Sync {
    /// Transmit one block of captured audio
    async fn send_audio(&self, blob: AudioBlob) -> Result<(), RemoteError>;

    /// Wait for the next inbound item
    /// Returns `Ok(None)` once the inbound stream has ended
    async fn receive(&self) -> Result<Option<InboundItem>, RemoteError>;

    /// Close the session; further calls fail or report end of stream
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_blob_from_frame() {
        let frame = AudioFrame::new(vec![1i16, 256], 16_000, 0);
        let blob = AudioBlob::pcm(&frame);

        assert_eq!(blob.mime_type, "audio/pcm;rate=16000");
        assert_eq!(&blob.data[..], &[1, 0, 0, 1]);
    }

    #[test]
    fn test_setup_appends_job_description() {
        let config = AppConfig::default();
        let setup = LiveSetup::for_interview(&config.remote, "Rust engineer");

        assert!(setup.system_instruction.starts_with(&config.remote.system_instruction));
        assert!(setup
            .system_instruction
            .ends_with("Use the following Job Description (JD) as context:\nRust engineer"));
        assert_eq!(setup.voice_name, config.remote.voice);
        assert_eq!(setup.model, config.remote.model);
    }
}
