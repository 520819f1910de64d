//! Error taxonomy shared by every container, adapter and converted operator.
//!
//! Nothing in this crate retries or downgrades an error to a default value;
//! each variant carries enough context (positions, expected vs. actual) to be
//! diagnosed without re-running the call.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required extra-configuration key is absent.
    #[error("missing required configuration key `{key}`: {reason}")]
    MissingConfig { key: &'static str, reason: String },

    /// A configuration value is present but unusable, or two flags conflict.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An input cannot be handed to the selected backend.
    #[error("input tensor {position} of unsupported type `{kind}` for the {backend} backend")]
    UnsupportedInput {
        position: usize,
        kind: &'static str,
        backend: &'static str,
    },

    /// An arithmetic post-processing step was asked to act on non-numeric data.
    #[error("cannot apply `{operation}` to an array of `{kind}`")]
    NonNumeric {
        operation: &'static str,
        kind: &'static str,
    },

    /// An algorithm parameter value this crate does not implement.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// The execution engine for a backend is not present.
    #[error("the {backend} runtime is not available: {reason}")]
    RuntimeUnavailable {
        backend: &'static str,
        reason: String,
    },

    /// A categorical encoder was queried with a value it was never fitted on.
    #[error("input row {row} ({value}) contains a previously unseen label; known labels: {vocabulary:?}")]
    VocabularyMiss {
        row: usize,
        value: String,
        vocabulary: Vec<String>,
    },

    /// Output arity, output names or array shapes disagree with the contract.
    #[error("{context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "candle")]
    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[cfg(feature = "onnx")]
    #[error(transparent)]
    Onnx(#[from] ort::Error),

    /// An engine failure with no structured error type of its own.
    #[error("{backend} backend failure: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
}

impl Error {
    pub(crate) fn shape(
        context: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Error::ShapeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
