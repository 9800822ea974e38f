//! Tracks which game, if any, is currently open.
//!
//! Owned by the coordinator task, so no locking: at most one game can be
//! open, and opening a new one implicitly replaces the old.

use crate::pipeline::messages::GameId;

/// The game currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveGame {
    /// Which game.
    pub game: GameId,
    /// Whether the automatic opponent plays.
    pub auto_opponent: bool,
}

/// Holds at most one active game.
#[derive(Debug, Default)]
pub struct GameHost {
    active: Option<ActiveGame>,
}

impl GameHost {
    /// Open a game, returning the game it replaced, if any.
    pub fn open(&mut self, game: GameId, auto_opponent: bool) -> Option<ActiveGame> {
        self.active.replace(ActiveGame {
            game,
            auto_opponent,
        })
    }

    /// Close the open game, returning it if one was open.
    pub fn close(&mut self) -> Option<ActiveGame> {
        self.active.take()
    }

    /// The open game, if any.
    pub fn active(&self) -> Option<&ActiveGame> {
        self.active.as_ref()
    }

    /// Whether any game is open.
    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }
}
