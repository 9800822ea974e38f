//! Game intent detection from transcribed speech.
//!
//! Pure phrase matching: the transcript is normalized and tested against
//! three synonym pattern groups, tie-broken in a fixed order
//! (tic-tac-toe → trivia → sudoku). Misheard spellings the recognizer
//! commonly produces ("suduko", "sodoku") are part of the groups.

use crate::pipeline::messages::GameId;
use regex::Regex;
use std::sync::LazyLock;

static TICTACTOE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\btic\s*tac\s*toe\b",
        r"\btictactoe\b",
        r"\bxo\b",
        r"\bnoughts\s*and\s*crosses\b",
        r"\bx\s*and\s*o\b",
        r"\bx\s*o\b",
        r"\btic\s*tac\b",
    ])
});

static TRIVIA_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\btrivia\b",
        r"\bquiz\b",
        r"\bquestion\s*game\b",
        r"\bquestions\b",
        r"\btrivial\s*pursuit\b",
        r"\bbrain\s*teaser\b",
        r"\bknowledge\s*test\b",
    ])
});

static SUDOKU_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\bsudoku\b",
        r"\bnumber\s*puzzle\b",
        r"\bnumber\s*game\b",
        r"\b9\s*by\s*9\b",
        r"\bnumbers\s*grid\b",
        r"\bpuzzle\s*grid\b",
        r"\bsuduko\b",
        r"\bsodoku\b",
    ])
});

/// "play/start/launch/open"-style verb phrases that introduce a game name.
static PLAY_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(let\s*us|lets)?\s*(play|start|launch|open)\b|\b(can\s+we|should\s+we|want\s+to|time\s+to|time\s+for)\s+(play|start)\b|\bi\s+(want|wanna)\s+(to\s+)?(play|start)\b",
    )
    .expect("play verb pattern")
});

/// Captures the phrase following a game-starting verb.
static AFTER_PLAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:play|open|start|launch|begin)\s+([a-z0-9\s]+)").expect("after-play pattern")
});

static GAME_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bgame\b").expect("game word pattern"));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("intent pattern"))
        .collect()
}

/// Lowercase, strip everything but alphanumerics and spaces, collapse runs
/// of whitespace.
fn normalize(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Test one candidate string against the three groups in priority order.
fn match_groups(text: &str) -> Option<GameId> {
    if TICTACTOE_PATTERNS.iter().any(|rx| rx.is_match(text)) {
        return Some(GameId::TicTacToe);
    }
    if TRIVIA_PATTERNS.iter().any(|rx| rx.is_match(text)) {
        return Some(GameId::Trivia);
    }
    if SUDOKU_PATTERNS.iter().any(|rx| rx.is_match(text)) {
        return Some(GameId::Sudoku);
    }
    None
}

/// Detect a game-launch intent in transcribed speech.
///
/// Resolution order:
/// 1. a direct synonym anywhere in the text,
/// 2. the phrase following a "play/start/launch/open" verb,
/// 3. a re-test of the full text when the word "game" appears.
///
/// Deterministic given identical input; returns `None` when nothing matches.
pub fn detect_game_intent(raw: &str) -> Option<GameId> {
    let cleaned = normalize(raw);
    if cleaned.is_empty() {
        return None;
    }

    if let Some(game) = match_groups(&cleaned) {
        return Some(game);
    }

    if PLAY_VERB.is_match(&cleaned)
        && let Some(caps) = AFTER_PLAY.captures(&cleaned)
        && let Some(candidate) = caps.get(1)
    {
        let candidate = candidate.as_str().trim();
        if !candidate.is_empty()
            && let Some(game) = match_groups(candidate)
        {
            return Some(game);
        }
    }

    if GAME_WORD.is_match(&cleaned) {
        return match_groups(&cleaned);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_synonyms() {
        assert_eq!(
            detect_game_intent("let's play tic tac toe"),
            Some(GameId::TicTacToe)
        );
        assert_eq!(
            detect_game_intent("noughts and crosses please"),
            Some(GameId::TicTacToe)
        );
        assert_eq!(detect_game_intent("I want a quiz"), Some(GameId::Trivia));
        assert_eq!(detect_game_intent("sudoku time"), Some(GameId::Sudoku));
    }

    #[test]
    fn misheard_sudoku_spellings() {
        assert_eq!(detect_game_intent("open suduko"), Some(GameId::Sudoku));
        assert_eq!(detect_game_intent("play sodoku"), Some(GameId::Sudoku));
    }

    #[test]
    fn normalization_strips_punctuation() {
        assert_eq!(
            detect_game_intent("Let's play Tic-Tac-Toe!"),
            Some(GameId::TicTacToe)
        );
    }

    #[test]
    fn tie_break_prefers_tictactoe() {
        assert_eq!(
            detect_game_intent("tic tac toe or trivia"),
            Some(GameId::TicTacToe)
        );
    }

    #[test]
    fn play_verb_extraction() {
        assert_eq!(
            detect_game_intent("can we play trivia now"),
            Some(GameId::Trivia)
        );
        assert_eq!(
            detect_game_intent("i wanna play sudoku"),
            Some(GameId::Sudoku)
        );
    }

    #[test]
    fn game_word_context() {
        assert_eq!(
            detect_game_intent("the xo game sounds fun"),
            Some(GameId::TicTacToe)
        );
    }

    #[test]
    fn no_match_returns_none() {
        assert_eq!(detect_game_intent("what's the weather like"), None);
        assert_eq!(detect_game_intent(""), None);
        assert_eq!(detect_game_intent("let's play outside"), None);
    }

    #[test]
    fn deterministic() {
        let input = "should we start a question game";
        assert_eq!(detect_game_intent(input), detect_game_intent(input));
        assert_eq!(detect_game_intent(input), Some(GameId::Trivia));
    }
}
