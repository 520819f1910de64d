//! # Estimator Runtime
//!
//! A backend-agnostic execution layer for classical machine learning models
//! that have been converted into tensor graphs.
//!
//! ## Overview
//!
//! A converted model is served through a [`Container`](container::Container)
//! exposing the familiar estimator methods (`transform`, `predict`,
//! `predict_proba`, `decision_function`, `score_samples`), whatever execution
//! engine actually runs the graph.
//!
//! Key components include:
//!
//! - Prediction containers composed from a backend adapter and a role
//! - A batch executor that splits large inputs into fixed-size partitions
//! - Backend adapters for candle, burn, ONNX Runtime and ahead-of-time compiled modules
//! - Converted operators, including label encoders that compare strings as packed integer words
//!
//! ## Architecture
//!
//! ### Assumptions
//! Regardless of backend used, two dimensions have special meanings:
//!  - The `0th` dimension is reserved as the batch (row) dimension
//!  - The `1st` dimension is reserved as the feature dimension
//!  - Arrays may fill in other dimensions
//!
//! ### Inputs
//!
//! Every prediction method takes [`Inputs`](tensor::Inputs): positional
//! arrays sharing one row count, or a tabular [`Frame`](tensor::Frame) split
//! into one column vector per column. Inputs are resolved once per call,
//! before any partitioning.
//!
//! ### Roles and capabilities
//!
//! Roles ([`Transformer`](container::Transformer), [`Regressor`](container::Regressor),
//! [`Classifier`](container::Classifier), [`AnomalyDetector`](container::AnomalyDetector))
//! select which capability traits a container implements. Adapters supply
//! per-backend primitives, and any adapter composes with every role it has
//! primitives for.
//!
//! ### Batching
//!
//! With a batch size configured, the [`BatchExecutor`](core::BatchExecutor)
//! scores one partition at a time and tells the adapter which
//! [`Partition`](core::Partition) it is scoring, so adapters holding a
//! remainder module can switch to it for the final, shorter partition.
//!
//! ## Features
//!
//! - **candle** - Enables the direct-graph backend and the converted operators (default)
//! - **burn** - Enables the compiled-graph backend (default)
//! - **onnx** - Enables the ONNX Runtime backend
//!
//! ## Implementation Details
//!
//! Containers build their backend session eagerly in
//! [`Container::new`](container::Container::new) and never retry; every
//! failure is reported as an [`Error`](error::Error) carrying the offending
//! position or the expected and actual values.
//!

pub mod backend;
pub mod config;
pub mod container;
pub mod core;
pub mod error;
pub mod tensor;

#[cfg_attr(docsrs, doc(cfg(feature = "candle")))]
#[cfg(feature = "candle")]
pub mod converters;

/// Constants for client reference
pub use tensor::constant;

pub use config::{ContainerConfig, ExecutionContext, ExtraConfig};
pub use container::{
    AnomalyDetector, Classifier, Container, Predicts, PredictsProba, Regressor, ScoresAnomalies,
    Transformer, Transforms,
};
pub use error::{Error, Result};
pub use tensor::{Frame, HostArray, Inputs};
