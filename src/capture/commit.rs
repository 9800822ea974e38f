//! Silence-triggered transcript commit.
//!
//! Partial results arm a quiet-period timer; a final result commits
//! immediately. Timers are generation-stamped so a late firing from a
//! superseded arm can never commit stale text.

use crate::pipeline::messages::Transcript;

/// What the caller should do after feeding a recognition result in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitAction {
    /// Nothing to do.
    None,
    /// (Re)arm the silence timer for this generation; any previously armed
    /// generation is stale.
    ArmTimer {
        /// Stamp to echo back through [`CommitBuffer::timer_fired`].
        generation: u64,
    },
    /// Commit this text now. The buffer has been cleared.
    Commit(String),
}

/// Buffers interim and final transcript text and decides when it commits.
///
/// Pure state machine; the owning task spawns the actual timer and routes
/// its firing back through [`CommitBuffer::timer_fired`].
#[derive(Debug, Default)]
pub struct CommitBuffer {
    transcript: Transcript,
    generation: u64,
}

impl CommitBuffer {
    /// Record an interim result.
    ///
    /// Non-empty text bumps the generation and asks the caller to arm the
    /// silence timer; empty text is ignored.
    pub fn on_partial(&mut self, text: &str) -> CommitAction {
        if text.trim().is_empty() {
            return CommitAction::None;
        }
        self.transcript.interim_text = text.to_owned();
        self.generation += 1;
        CommitAction::ArmTimer {
            generation: self.generation,
        }
    }

    /// Record a final result.
    ///
    /// Non-empty text commits immediately. Either way the generation is
    /// bumped so an armed silence timer becomes stale.
    pub fn on_final(&mut self, text: &str) -> CommitAction {
        self.generation += 1;
        if text.trim().is_empty() {
            return CommitAction::None;
        }
        self.transcript.final_text = text.to_owned();
        let committed = self.transcript.final_text.trim().to_owned();
        self.transcript.clear();
        CommitAction::Commit(committed)
    }

    /// A previously armed silence timer fired.
    ///
    /// Returns the committed text only when the stamp is still current and
    /// the buffer holds something worth sending.
    pub fn timer_fired(&mut self, generation: u64) -> Option<String> {
        if generation != self.generation {
            return None;
        }
        let best = self.transcript.best().trim().to_owned();
        if best.is_empty() {
            return None;
        }
        self.transcript.clear();
        Some(best)
    }

    /// Best-known text for live display.
    pub fn display_text(&self) -> &str {
        self.transcript.best()
    }

    /// Drop buffered text and invalidate any armed timer.
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.generation += 1;
    }
}
