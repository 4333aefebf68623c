//! Kafka trivia quiz

use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuizQuestion {
    pub question: &'static str,
    pub answer: &'static str,
}

pub const QUESTIONS: &[QuizQuestion] = &[
    QuizQuestion {
        question: "What does Gregor Samsa transform into?",
        answer: "insect",
    },
    QuizQuestion {
        question: "What is Gregor's profession before his transformation?",
        answer: "salesman",
    },
    QuizQuestion {
        question: "What is the name of Gregor's sister?",
        answer: "Grete",
    },
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuizOutcome {
    Correct,
    Incorrect { expected: &'static str },
}

impl QuizQuestion {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> QuizQuestion {
        QUESTIONS.choose(rng).copied().unwrap_or(QUESTIONS[0])
    }

    /// Case-insensitive, whitespace-trimmed comparison
    pub fn check(&self, answer: &str) -> QuizOutcome {
        if answer.trim().to_lowercase() == self.answer.to_lowercase() {
            QuizOutcome::Correct
        } else {
            QuizOutcome::Incorrect {
                expected: self.answer,
            }
        }
    }
}
