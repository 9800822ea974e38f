//! Tic-tac-toe with an automatic opponent.
//!
//! The opponent policy is deliberately beatable by a child: take a winning
//! cell if one exists, block the player's winning cell, then prefer the
//! centre, a corner, and finally any free cell at random.

use rand::seq::SliceRandom;

/// The eight winning lines on a 3x3 board.
const WIN_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

const CENTRE: usize = 4;
const CORNERS: [usize; 4] = [0, 2, 6, 8];

/// A player's mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    /// The child.
    X,
    /// The automatic opponent.
    O,
}

impl Mark {
    /// The other mark.
    pub fn other(self) -> Self {
        match self {
            Self::X => Self::O,
            Self::O => Self::X,
        }
    }
}

/// How a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// This mark completed a line.
    Win(Mark),
    /// The board filled with no winner.
    Draw,
}

/// A 3x3 board, cells indexed 0..9 row-major.
#[derive(Debug, Clone, Default)]
pub struct Board {
    cells: [Option<Mark>; 9],
}

impl Board {
    /// An empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a mark. Returns `false` when the cell is taken or out of range.
    pub fn place(&mut self, cell: usize, mark: Mark) -> bool {
        match self.cells.get(cell) {
            Some(None) => {
                self.cells[cell] = Some(mark);
                true
            }
            _ => false,
        }
    }

    /// The mark in a cell.
    pub fn cell(&self, cell: usize) -> Option<Mark> {
        self.cells.get(cell).copied().flatten()
    }

    /// The game's outcome, if it is over.
    pub fn outcome(&self) -> Option<Outcome> {
        for line in WIN_LINES {
            if let Some(mark) = self.cells[line[0]]
                && self.cells[line[1]] == Some(mark)
                && self.cells[line[2]] == Some(mark)
            {
                return Some(Outcome::Win(mark));
            }
        }
        if self.cells.iter().all(Option::is_some) {
            return Some(Outcome::Draw);
        }
        None
    }

    /// Indices of empty cells.
    pub fn free_cells(&self) -> Vec<usize> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.is_none().then_some(i))
            .collect()
    }

    /// A cell that completes a line for `mark`, if one exists.
    fn winning_cell(&self, mark: Mark) -> Option<usize> {
        for line in WIN_LINES {
            let marks: Vec<_> = line.iter().map(|&i| self.cells[i]).collect();
            let owned = marks.iter().filter(|&&m| m == Some(mark)).count();
            let empty = marks.iter().filter(|m| m.is_none()).count();
            if owned == 2
                && empty == 1
                && let Some(pos) = marks.iter().position(Option::is_none)
            {
                return Some(line[pos]);
            }
        }
        None
    }
}

/// Pick the automatic opponent's move for `mark`, or `None` when the board
/// is full.
pub fn opponent_move(board: &Board, mark: Mark) -> Option<usize> {
    if let Some(cell) = board.winning_cell(mark) {
        return Some(cell);
    }
    if let Some(cell) = board.winning_cell(mark.other()) {
        return Some(cell);
    }
    if board.cell(CENTRE).is_none() {
        return Some(CENTRE);
    }
    let free: Vec<usize> = CORNERS
        .iter()
        .copied()
        .filter(|&c| board.cell(c).is_none())
        .collect();
    if let Some(&cell) = free.choose(&mut rand::thread_rng()) {
        return Some(cell);
    }
    board.free_cells().choose(&mut rand::thread_rng()).copied()
}

/// The finished game from the child's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    /// The child won.
    PlayerWin,
    /// The opponent won.
    OpponentWin,
    /// Nobody won.
    Draw,
}

const PLAYER_WIN_REPLIES: [&str; 3] = [
    "You won! Amazing job!",
    "Wow, you beat me! Well played!",
    "You're the champion! Great game!",
];

const OPPONENT_WIN_REPLIES: [&str; 3] = [
    "I won this time! Want to play again?",
    "Got you! Let's have a rematch!",
    "That one was mine! Try again?",
];

const DRAW_REPLIES: [&str; 3] = [
    "It's a tie! We're evenly matched!",
    "A draw! Great minds think alike!",
    "Nobody won that one. Rematch?",
];

/// A spoken line for a finished game, varied so repeat games do not sound
/// canned.
pub fn result_reply(result: GameResult) -> &'static str {
    let pool: &[&str] = match result {
        GameResult::PlayerWin => &PLAYER_WIN_REPLIES,
        GameResult::OpponentWin => &OPPONENT_WIN_REPLIES,
        GameResult::Draw => &DRAW_REPLIES,
    };
    pool.choose(&mut rand::thread_rng()).unwrap_or(&pool[0])
}
