//! LLM Module: Vocabulary, model loading and next-word inference
//!
//! # Components
//! - `vocab.rs`: Frequency-ranked word vocabulary and tokenizer
//! - `config.rs`: Saved architecture parsing and the legacy key patch
//! - `layers.rs`: Embedding, LSTM, bidirectional and dense layers on Candle
//! - `model.rs`: Model bundle loading and the forward pass
//! - `predict.rs`: Greedy next-word prediction and generation

pub mod config;
pub mod layers;
pub mod model;
pub mod predict;
pub mod vocab;

pub use model::{Model, ModelBundle};
pub use predict::{Predictor, CONTEXT_WORDS};
pub use vocab::Vocab;
