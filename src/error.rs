//! Error type shared by the vocabulary, model loader and predictor

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model bundle could not be decoded: {0}")]
    Bundle(#[from] bincode::Error),

    #[error("architecture JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid model architecture: {0}")]
    Architecture(String),

    #[error("missing weight tensor `{0}`")]
    MissingWeight(String),

    #[error("weight `{0}` does not belong to any named layer")]
    UnmappedWeight(String),

    #[error("weight `{name}` has shape {actual:?}, expected {expected:?}")]
    WeightShape {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("token index {index} is outside the model's embedding table of {limit} rows")]
    TokenOutOfRange { index: u32, limit: usize },

    #[error("model predicted index {0}, which is not in the vocabulary")]
    UnknownIndex(usize),

    #[error("model returned an empty distribution")]
    EmptyDistribution,
}

impl PredictError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PredictError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PredictError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_names_path() {
        let err = PredictError::io(
            "data/missing.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        let message = err.to_string();
        assert!(message.contains("data/missing.txt"));
        assert!(message.contains("no such file"));
    }
}
