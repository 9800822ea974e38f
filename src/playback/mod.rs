//! Speech playback: the text-to-speech side of the loop.
//!
//! The synthesizer sits behind [`SynthesisEngine`]; this module owns voice
//! selection and the playback session that guarantees exactly one completion
//! signal per utterance, however the utterance actually ends.

pub mod session;

pub use session::{PlaybackEvent, PlaybackSession, SpeakRequest};

use crate::config::PlaybackConfig;
use async_trait::async_trait;

/// A synthesizer voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Human-readable voice name as reported by the engine.
    pub name: String,
    /// BCP-47 language tag of the voice.
    pub lang: String,
}

impl Voice {
    /// Build a voice.
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

/// One utterance handed to the engine.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Text to speak.
    pub text: String,
    /// Selected voice, when one matched; engine default otherwise.
    pub voice: Option<Voice>,
    /// Speaking rate.
    pub rate: f32,
    /// Pitch.
    pub pitch: f32,
    /// Volume.
    pub volume: f32,
}

impl Utterance {
    /// Build an utterance with the configured prosody.
    pub fn new(text: impl Into<String>, voice: Option<Voice>, config: &PlaybackConfig) -> Self {
        Self {
            text: text.into(),
            voice,
            rate: config.rate,
            pitch: config.pitch,
            volume: config.volume,
        }
    }
}

/// Classified synthesis failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisErrorKind {
    /// Audio output permission was denied.
    PermissionDenied,
    /// The utterance was cancelled mid-flight.
    Interrupted,
    /// Anything else.
    Other,
}

/// An error reported by the synthesis engine.
#[derive(Debug, Clone, thiserror::Error)]
#[error("synthesis error ({kind:?}): {message}")]
pub struct SynthesisError {
    /// Failure class, used to pick the fallback path.
    pub kind: SynthesisErrorKind,
    /// Engine-specific detail for logging.
    pub message: String,
}

impl SynthesisError {
    /// Build an error of the given kind.
    pub fn new(kind: SynthesisErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Events emitted by a synthesis engine.
///
/// Every event carries the token `speak` returned for the utterance it
/// belongs to, so a late event from a cancelled utterance can never be
/// mistaken for its successor's.
#[derive(Debug, Clone)]
pub enum SynthesisEvent {
    /// Audio output began.
    Started {
        /// Utterance this event belongs to.
        token: u64,
    },
    /// The utterance finished playing.
    Ended {
        /// Utterance this event belongs to.
        token: u64,
    },
    /// The utterance failed or was cut short.
    Error {
        /// Utterance this event belongs to.
        token: u64,
        /// Failure class.
        kind: SynthesisErrorKind,
    },
}

impl SynthesisEvent {
    /// The utterance token this event carries.
    pub fn token(&self) -> u64 {
        match *self {
            Self::Started { token } | Self::Ended { token } | Self::Error { token, .. } => token,
        }
    }
}

/// Boundary to the host speech synthesizer.
#[async_trait]
pub trait SynthesisEngine: Send {
    /// Voices currently available. May be empty while the engine warms up.
    fn voices(&self) -> Vec<Voice>;

    /// Queue an utterance for playback, returning its event token.
    async fn speak(&mut self, utterance: &Utterance) -> Result<u64, SynthesisError>;

    /// Cancel any queued or playing utterances.
    async fn cancel(&mut self);

    /// Resume the engine if it is paused.
    async fn resume(&mut self);

    /// Whether the engine is audibly speaking right now.
    fn is_speaking(&self) -> bool;

    /// Whether the engine has queued utterances it has not started.
    fn is_pending(&self) -> bool;

    /// Wait for the next engine event. `None` means the engine is gone.
    async fn next_event(&mut self) -> Option<SynthesisEvent>;
}

/// Pick the best available voice for the configured hints.
///
/// Preference ladder, first match wins: named + exact language + gender,
/// named + exact language, named + language family, exact language + gender,
/// exact language, language family, then whatever comes first. Returns
/// `None` only when no voices exist at all.
pub fn select_voice<'a>(voices: &'a [Voice], config: &PlaybackConfig) -> Option<&'a Voice> {
    if voices.is_empty() {
        return None;
    }
    let language = config.voice_language.to_lowercase();
    let family = language.split('-').next().unwrap_or(&language).to_owned();
    let name_hint = config.voice_name_hint.to_lowercase();
    let gender_hint = config.voice_gender_hint.to_lowercase();

    let named = |v: &Voice| v.name.to_lowercase().contains(&name_hint);
    let gendered = |v: &Voice| v.name.to_lowercase().contains(&gender_hint);
    let exact = |v: &Voice| v.lang.to_lowercase().starts_with(&language);
    let familial = |v: &Voice| v.lang.to_lowercase().starts_with(&family);

    voices
        .iter()
        .find(|v| named(v) && exact(v) && gendered(v))
        .or_else(|| voices.iter().find(|v| named(v) && exact(v)))
        .or_else(|| voices.iter().find(|v| named(v) && familial(v)))
        .or_else(|| voices.iter().find(|v| exact(v) && gendered(v)))
        .or_else(|| voices.iter().find(|v| exact(v)))
        .or_else(|| voices.iter().find(|v| familial(v)))
        .or_else(|| voices.first())
}
