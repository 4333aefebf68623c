//! App content: prompts, about text and the Kafka quiz
//!
//! # Components
//! - `prompts.rs`: Placeholder phrases, sentence starters, about panel
//! - `quiz.rs`: Quiz questions and answer checking

pub mod prompts;
pub mod quiz;

pub use quiz::{QuizOutcome, QuizQuestion};
