//! Speech capture: the continuous speech-to-text listener.
//!
//! The recognizer itself is an external collaborator behind the
//! [`RecognitionEngine`] trait; this module owns its lifecycle: the start
//! guard, the restart cooldown, error backoff, and the supervisory health
//! tick that recovers from missed restart schedules.

pub mod commit;
pub mod session;

pub use commit::{CommitAction, CommitBuffer};
pub use session::{CaptureEvent, CaptureSession};

use async_trait::async_trait;

/// Classified recognition failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// Microphone permission was denied. Terminal: no auto-restart.
    PermissionDenied,
    /// The engine was asked to start while already running. Treated as
    /// "assume listening" rather than retried.
    InvalidState,
    /// Network, no-speech, aborted, and everything else recoverable.
    Transient,
}

/// An error reported by the recognition engine.
#[derive(Debug, Clone, thiserror::Error)]
#[error("recognition error ({kind:?}): {message}")]
pub struct RecognitionError {
    /// Failure class, used to pick the recovery path.
    pub kind: RecognitionErrorKind,
    /// Engine-specific detail for logging.
    pub message: String,
}

impl RecognitionError {
    /// Build an error of the given kind.
    pub fn new(kind: RecognitionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Events emitted by a recognition engine.
#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    /// The engine confirmed it is listening.
    Started,
    /// An interim (non-final) transcript.
    Partial(String),
    /// A final transcript for the current utterance.
    Final(String),
    /// The engine stopped (normal end of a recognition run).
    Ended,
    /// The engine reported an error; the run is over.
    Error(RecognitionErrorKind),
}

/// Boundary to the host speech recognizer.
///
/// Implementations wrap a continuous, interim-result-capable recognizer.
/// `start` may legitimately fail with [`RecognitionErrorKind::InvalidState`]
/// when the engine is already running; the session treats that as non-fatal.
#[async_trait]
pub trait RecognitionEngine: Send {
    /// Begin continuous recognition.
    async fn start(&mut self) -> Result<(), RecognitionError>;

    /// End recognition if active.
    async fn stop(&mut self) -> Result<(), RecognitionError>;

    /// Wait for the next engine event. `None` means the engine is gone.
    async fn next_event(&mut self) -> Option<RecognitionEvent>;
}
