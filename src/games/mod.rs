//! Embedded games and the host that owns which one is open.

pub mod host;
pub mod sudoku;
pub mod tictactoe;
pub mod trivia;

pub use host::{ActiveGame, GameHost};
