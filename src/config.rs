//! Application configuration
//!
//! Loaded from a TOML file (missing sections fall back to defaults), then
//! adjusted from the environment: `PORT` overrides the HTTP port and the
//! API key is read from the variable named by `remote.api_key_env`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::playback::OverflowPolicy;
use crate::constants::*;
use crate::error::{Error, RemoteError, Result};

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub remote: RemoteConfig,
    pub session: SessionTiming,
    pub ui: UiConfig,
}

/// Hardware streams and the buffers between them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name, default device if unset
    pub input_device: Option<String>,
    /// Output device name, default device if unset
    pub output_device: Option<String>,
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    pub capture_block_size: u32,
    pub playback_block_size: u32,
    pub input_queue_capacity: usize,
    pub output_queue_capacity: usize,
    /// Playback refills until it holds this many callback blocks
    pub refill_factor: usize,
    /// Hard cap on buffered playback samples
    pub max_playback_samples: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            capture_sample_rate: CAPTURE_SAMPLE_RATE,
            playback_sample_rate: PLAYBACK_SAMPLE_RATE,
            capture_block_size: CAPTURE_BLOCK_SIZE,
            playback_block_size: PLAYBACK_BLOCK_SIZE,
            input_queue_capacity: INPUT_QUEUE_CAPACITY,
            output_queue_capacity: OUTPUT_QUEUE_CAPACITY,
            refill_factor: REFILL_FACTOR,
            max_playback_samples: MAX_PLAYBACK_SAMPLES,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

/// Remote streaming endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub response_modality: String,
    /// Base instruction, extended with the job description per session
    pub system_instruction: String,
    /// Ask the endpoint to transcribe the user's speech
    pub transcribe_input: bool,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub connect_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            response_modality: "AUDIO".to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            transcribe_input: true,
            api_key_env: "GEMINI_API_KEY".to_string(),
            connect_timeout_ms: 10_000,
        }
    }
}

impl RemoteConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> std::result::Result<String, RemoteError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(RemoteError::MissingApiKey(self.api_key_env.clone())),
        }
    }
}

/// Polling and shutdown timing of the session tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTiming {
    /// Sender idle wait when the input queue is empty
    pub send_poll_ms: u64,
    /// Pause after a failed transmit
    pub send_failure_backoff_ms: u64,
    /// Pause before re-reading an ended receive stream
    pub receive_retry_ms: u64,
    /// Supervisory loop tick for draining stream faults
    pub supervise_interval_ms: u64,
    /// How long teardown waits for each task before aborting it
    pub task_shutdown_grace_ms: u64,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            send_poll_ms: SEND_POLL_INTERVAL_MS,
            send_failure_backoff_ms: SEND_FAILURE_BACKOFF_MS,
            receive_retry_ms: RECEIVE_RETRY_DELAY_MS,
            supervise_interval_ms: SUPERVISE_INTERVAL_MS,
            task_shutdown_grace_ms: TASK_SHUTDOWN_GRACE_MS,
        }
    }
}

impl SessionTiming {
    pub fn send_poll(&self) -> Duration {
        Duration::from_millis(self.send_poll_ms)
    }

    pub fn send_failure_backoff(&self) -> Duration {
        Duration::from_millis(self.send_failure_backoff_ms)
    }

    pub fn receive_retry(&self) -> Duration {
        Duration::from_millis(self.receive_retry_ms)
    }

    pub fn supervise_interval(&self) -> Duration {
        Duration::from_millis(self.supervise_interval_ms)
    }

    pub fn task_shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.task_shutdown_grace_ms)
    }
}

/// HTTP control surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl AppConfig {
    /// Default config file location for this platform
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "live-interviewer", "live-interviewer")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration
    ///
    /// An explicit path must exist. Without one the default location is
    /// used when present, otherwise built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            match port.parse() {
                Ok(port) => self.ui.http_port = port,
                Err(_) => tracing::warn!("Ignoring invalid PORT value: {}", port),
            }
        }
    }

    /// Reject settings the session cannot run with
    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        if audio.capture_sample_rate == 0 || audio.playback_sample_rate == 0 {
            return Err(Error::Config("sample rates must be non-zero".into()));
        }
        if audio.capture_block_size == 0 || audio.playback_block_size == 0 {
            return Err(Error::Config("block sizes must be non-zero".into()));
        }
        if audio.input_queue_capacity == 0 || audio.output_queue_capacity == 0 {
            return Err(Error::Config("queue capacities must be non-zero".into()));
        }
        if audio.refill_factor == 0 {
            return Err(Error::Config("refill_factor must be at least 1".into()));
        }
        let refill_window = audio.playback_block_size as usize * audio.refill_factor;
        if audio.max_playback_samples < refill_window {
            return Err(Error::Config(format!(
                "max_playback_samples ({}) is smaller than one refill window ({})",
                audio.max_playback_samples, refill_window
            )));
        }
        if self.remote.model.trim().is_empty() {
            return Err(Error::Config("remote.model must not be empty".into()));
        }
        Ok(())
    }
}
