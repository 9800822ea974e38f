//! Sudoku puzzle generation.
//!
//! A full grid is produced by a randomized backtracking fill, then cells are
//! removed according to difficulty. Removal does not verify uniqueness; the
//! audience is children, and any consistent solution is accepted via the
//! retained solved grid.

use rand::seq::SliceRandom;
use rand::Rng;

/// A 9x9 grid; `None` is an empty cell.
pub type Grid = [[Option<u8>; 9]; 9];

/// Puzzle difficulty, measured in removed cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    /// 40 holes.
    Easy,
    /// 50 holes.
    Medium,
    /// 60 holes.
    Hard,
}

impl Difficulty {
    fn holes(self) -> usize {
        match self {
            Self::Easy => 40,
            Self::Medium => 50,
            Self::Hard => 60,
        }
    }
}

/// A generated puzzle together with its solution.
#[derive(Debug, Clone)]
pub struct Puzzle {
    /// The grid with holes, as shown to the player.
    pub puzzle: Grid,
    /// The filled grid it was carved from.
    pub solution: Grid,
}

/// Whether placing `value` at (`row`, `col`) keeps the grid consistent.
pub fn placement_valid(grid: &Grid, row: usize, col: usize, value: u8) -> bool {
    for i in 0..9 {
        if grid[row][i] == Some(value) || grid[i][col] == Some(value) {
            return false;
        }
    }
    let (box_row, box_col) = (row / 3 * 3, col / 3 * 3);
    for r in box_row..box_row + 3 {
        for c in box_col..box_col + 3 {
            if grid[r][c] == Some(value) {
                return false;
            }
        }
    }
    true
}

fn fill(grid: &mut Grid, rng: &mut impl Rng) -> bool {
    let Some((row, col)) = first_empty(grid) else {
        return true;
    };
    let mut values: Vec<u8> = (1..=9).collect();
    values.shuffle(rng);
    for value in values {
        if placement_valid(grid, row, col, value) {
            grid[row][col] = Some(value);
            if fill(grid, rng) {
                return true;
            }
            grid[row][col] = None;
        }
    }
    false
}

fn first_empty(grid: &Grid) -> Option<(usize, usize)> {
    for row in 0..9 {
        for col in 0..9 {
            if grid[row][col].is_none() {
                return Some((row, col));
            }
        }
    }
    None
}

/// Generate a puzzle of the given difficulty.
pub fn generate(difficulty: Difficulty) -> Puzzle {
    let mut rng = rand::thread_rng();
    let mut solution: Grid = [[None; 9]; 9];
    // A randomized backtracking fill always succeeds from an empty grid.
    fill(&mut solution, &mut rng);

    let mut puzzle = solution;
    let mut cells: Vec<(usize, usize)> = (0..9)
        .flat_map(|r| (0..9).map(move |c| (r, c)))
        .collect();
    cells.shuffle(&mut rng);
    for &(row, col) in cells.iter().take(difficulty.holes()) {
        puzzle[row][col] = None;
    }

    Puzzle { puzzle, solution }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    fn assert_solved(grid: &Grid) {
        for row in 0..9 {
            for col in 0..9 {
                let value = grid[row][col].expect("cell filled");
                assert!((1..=9).contains(&value));
                let mut probe = *grid;
                probe[row][col] = None;
                assert!(
                    placement_valid(&probe, row, col, value),
                    "cell ({row},{col}) breaks consistency"
                );
            }
        }
    }

    #[test]
    fn generated_solution_is_consistent() {
        let puzzle = generate(Difficulty::Easy);
        assert_solved(&puzzle.solution);
    }

    #[test]
    fn difficulty_controls_hole_count() {
        for (difficulty, holes) in [
            (Difficulty::Easy, 40),
            (Difficulty::Medium, 50),
            (Difficulty::Hard, 60),
        ] {
            let puzzle = generate(difficulty);
            let empty = puzzle
                .puzzle
                .iter()
                .flatten()
                .filter(|c| c.is_none())
                .count();
            assert_eq!(empty, holes);
        }
    }

    #[test]
    fn puzzle_cells_agree_with_the_solution() {
        let puzzle = generate(Difficulty::Medium);
        for row in 0..9 {
            for col in 0..9 {
                if let Some(value) = puzzle.puzzle[row][col] {
                    assert_eq!(Some(value), puzzle.solution[row][col]);
                }
            }
        }
    }

    #[test]
    fn placement_validity_checks_row_column_and_box() {
        let mut grid: Grid = [[None; 9]; 9];
        grid[0][0] = Some(5);
        assert!(!placement_valid(&grid, 0, 8, 5), "row conflict");
        assert!(!placement_valid(&grid, 8, 0, 5), "column conflict");
        assert!(!placement_valid(&grid, 1, 1, 5), "box conflict");
        assert!(placement_valid(&grid, 4, 4, 5));
        assert!(placement_valid(&grid, 0, 1, 3));
    }
}
