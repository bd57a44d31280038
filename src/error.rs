//! Error types for the live interview session

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Remote session error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug, Clone)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("cpal error: {0}")]
    CpalError(String),
}

impl From<cpal::SupportedStreamConfigsError> for AudioError {
    fn from(err: cpal::SupportedStreamConfigsError) -> Self {
        AudioError::CpalError(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        AudioError::StreamError(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for AudioError {
    fn from(err: cpal::PlayStreamError) -> Self {
        AudioError::StreamError(err.to_string())
    }
}

impl From<cpal::DevicesError> for AudioError {
    fn from(err: cpal::DevicesError) -> Self {
        AudioError::CpalError(err.to_string())
    }
}

/// Errors talking to the remote streaming endpoint
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("API key not set (expected in ${0})")]
    MissingApiKey(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Session setup rejected: {0}")]
    SetupFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Session closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for RemoteError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => RemoteError::Closed,
            other => RemoteError::ConnectionFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::InvalidMessage(err.to_string())
    }
}

/// Session lifecycle errors
///
/// `AlreadyRunning` and `NotRunning` are conflicts reported to the caller,
/// not faults; no state is mutated when they are returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Interview session already running")]
    AlreadyRunning,

    #[error("No interview session running")]
    NotRunning,

    #[error("Failed to spawn session worker: {0}")]
    SpawnFailed(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
