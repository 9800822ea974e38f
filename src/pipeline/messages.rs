//! Shared types passed between the interaction sessions and the coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the speech capture session, as tracked by the coordinator.
///
/// The capture session reports transitions through events; only the
/// coordinator task mutates this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Recognition is not running.
    Idle,
    /// The engine is actively listening.
    Listening,
}

/// Rolling transcript for the utterance currently being captured.
///
/// `final_text` is authoritative once the recognizer marks a result final;
/// `interim_text` is advisory and superseded on every event.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    /// Latest interim (non-final) text.
    pub interim_text: String,
    /// Accumulated final text for this utterance.
    pub final_text: String,
}

impl Transcript {
    /// Best-known text: the final text when present, else the interim.
    pub fn best(&self) -> &str {
        if self.final_text.trim().is_empty() {
            &self.interim_text
        } else {
            &self.final_text
        }
    }

    /// Drop all buffered text.
    pub fn clear(&mut self) {
        self.interim_text.clear();
        self.final_text.clear();
    }
}

/// Speaker role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The child speaking to the assistant.
    User,
    /// The assistant's reply.
    Assistant,
}

/// A single turn in the conversation history.
///
/// The history is ordered and append-only; it is carried whole on every
/// relay request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who produced this turn.
    pub role: Role,
    /// The turn's text.
    pub content: String,
}

impl ConversationTurn {
    /// Build a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Build an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The three embedded games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameId {
    /// Tic-tac-toe with an automatic opponent.
    TicTacToe,
    /// Multiple-choice trivia.
    Trivia,
    /// 9×9 sudoku.
    Sudoku,
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TicTacToe => write!(f, "tictactoe"),
            Self::Trivia => write!(f, "trivia"),
            Self::Sudoku => write!(f, "sudoku"),
        }
    }
}

/// A deferred instruction to open a game once the spoken reply completes.
///
/// At most one is outstanding at a time, owned by the coordinator and
/// consumed exactly once via `Option::take`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingGameLaunch {
    /// Which game to open.
    pub game: GameId,
    /// Whether the game should play against an automatic opponent.
    pub auto_opponent: bool,
}

/// Microphone status shown to the user.
///
/// Best-effort truth: allowed to lag the underlying engine by a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicStatus {
    /// The assistant is speaking.
    Speaking,
    /// Capture is paused while a relay is in flight.
    ListeningPaused,
    /// The microphone is live.
    Listening,
    /// Recognition is not running.
    Idle,
}

impl fmt::Display for MicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Speaking => write!(f, "Speaking…"),
            Self::ListeningPaused => write!(f, "Listening paused"),
            Self::Listening => write!(f, "Listening…"),
            Self::Idle => write!(f, "Microphone Idle"),
        }
    }
}

/// Events broadcast to the rendering layer.
///
/// The UI is purely reactive: it draws these and sends back only the
/// permission grant and game-close commands.
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// Show the live transcript of what the child is saying.
    DisplayTranscript(String),
    /// Show the assistant's reply text (subtitle while speaking, or the
    /// text-only fallback).
    DisplayReply(String),
    /// Clear any displayed transcript/reply text.
    ClearDisplay,
    /// Microphone status changed.
    MicStatus(MicStatus),
    /// Speech permission has not been granted yet; show the one-time prompt.
    PermissionRequired,
    /// A game was opened.
    GameOpened {
        /// Which game.
        game: GameId,
        /// Whether the automatic opponent is enabled.
        auto_opponent: bool,
    },
    /// The open game was closed.
    GameClosed,
}
