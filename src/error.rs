//! Error types for the OneRobo interaction runtime.

/// Top-level error type for the voice-interaction system.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Speech recognition engine or capture session error.
    #[error("capture error: {0}")]
    Capture(String),

    /// Speech synthesis engine or playback session error.
    #[error("playback error: {0}")]
    Playback(String),

    /// Dialogue relay transport or contract error.
    #[error("relay error: {0}")]
    Relay(String),

    /// Reminder document store error.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Interaction coordination error.
    #[error("coordinator error: {0}")]
    Coordinator(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
