//! Multiple-choice trivia.
//!
//! Question supply is a seam: the built-in set keeps the game playable
//! offline, and a networked source can be dropped in behind the same trait.

use crate::error::Result;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// One multiple-choice question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriviaQuestion {
    /// The question text.
    pub question: String,
    /// The right answer.
    pub correct_answer: String,
    /// Wrong answers to mix in.
    pub incorrect_answers: Vec<String>,
}

impl TriviaQuestion {
    /// All answers, shuffled for presentation.
    pub fn shuffled_answers(&self) -> Vec<String> {
        let mut answers: Vec<String> = self.incorrect_answers.clone();
        answers.push(self.correct_answer.clone());
        answers.shuffle(&mut rand::thread_rng());
        answers
    }

    /// Whether a given answer is the right one.
    pub fn is_correct(&self, answer: &str) -> bool {
        answer.eq_ignore_ascii_case(&self.correct_answer)
    }
}

/// Where questions come from.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Fetch up to `count` questions.
    async fn questions(&self, count: usize) -> Result<Vec<TriviaQuestion>>;
}

/// Built-in kid-friendly question set.
#[derive(Debug, Default)]
pub struct BuiltinQuestions;

fn question(q: &str, correct: &str, incorrect: [&str; 3]) -> TriviaQuestion {
    TriviaQuestion {
        question: q.to_owned(),
        correct_answer: correct.to_owned(),
        incorrect_answers: incorrect.iter().map(|s| (*s).to_owned()).collect(),
    }
}

fn builtin_set() -> Vec<TriviaQuestion> {
    vec![
        question(
            "What color do you get when you mix blue and yellow?",
            "Green",
            ["Purple", "Orange", "Brown"],
        ),
        question(
            "How many legs does a spider have?",
            "Eight",
            ["Six", "Four", "Ten"],
        ),
        question(
            "Which animal is known as the king of the jungle?",
            "Lion",
            ["Tiger", "Elephant", "Bear"],
        ),
        question(
            "What do bees make?",
            "Honey",
            ["Milk", "Jam", "Bread"],
        ),
        question(
            "How many days are there in a week?",
            "Seven",
            ["Five", "Six", "Eight"],
        ),
        question(
            "What is the closest star to Earth?",
            "The Sun",
            ["The Moon", "Mars", "Polaris"],
        ),
        question(
            "Which shape has three sides?",
            "Triangle",
            ["Square", "Circle", "Rectangle"],
        ),
        question(
            "What do caterpillars turn into?",
            "Butterflies",
            ["Bees", "Birds", "Frogs"],
        ),
    ]
}

#[async_trait]
impl QuestionSource for BuiltinQuestions {
    async fn questions(&self, count: usize) -> Result<Vec<TriviaQuestion>> {
        let mut set = builtin_set();
        set.shuffle(&mut rand::thread_rng());
        set.truncate(count);
        Ok(set)
    }
}
