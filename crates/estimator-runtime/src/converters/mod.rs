//! # Converted operators
//!
//! Tensor graphs for a representative set of classical estimators, ready to
//! be served through [`CandleAdapter`](crate::backend::candle::CandleAdapter):
//!
//! * [`label_encoder`] - string and numeric label lookup by tensor equality
//! * [`kneighbors`] - k-nearest-neighbour classification and regression
//! * [`imputer`] - missing value replacement
//! * [`vector_assembler`] - feature column concatenation
pub mod imputer;
pub mod kneighbors;
pub mod label_encoder;
pub mod vector_assembler;

pub use imputer::{MissingValue, SimpleImputer};
pub use kneighbors::{convert_kneighbors, KNeighborsModel, KNeighborsParams, Targets, Weights};
pub use label_encoder::{NumericLabelEncoder, StringLabelEncoder};
pub use vector_assembler::VectorAssembler;
