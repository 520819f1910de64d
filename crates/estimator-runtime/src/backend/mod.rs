//! # Backend adapters
//!
//! This module binds converted models to their execution engines, so that
//! containers can run them in a backend-agnostic manner.
//!
//! Every adapter implements [`Adapter`] plus the container primitives its
//! graphs support, and reads graph results through the shared
//! [`GraphOutput`] contract.
//!
//! ## Feature Flags
//!
//! - `candle`: direct-graph execution with [`candle::CandleAdapter`], and the
//!   static-shape compiled module in [`static_module`]
//! - `burn`: compiled-graph execution with [`burn::BurnAdapter`]
//! - `onnx`: interchange-format execution with [`onnx::OnnxAdapter`]
//!
//! [`accelerated::AcceleratedAdapter`] is always available; it runs any
//! [`CompiledModule`] handed in through the extra configuration.

mod core_trait;
mod kind;

pub mod accelerated;

#[cfg_attr(docsrs, doc(cfg(feature = "candle")))]
#[cfg(feature = "candle")]
/// Direct-graph adapter over candle tensors.
///
/// Graphs implement [`candle::TensorGraph`] and receive their inputs in
/// their native element type.
pub mod candle;

#[cfg_attr(docsrs, doc(cfg(feature = "candle")))]
#[cfg(feature = "candle")]
/// A fixed-shape [`CompiledModule`] built from a candle graph.
pub mod static_module;

#[cfg_attr(docsrs, doc(cfg(feature = "burn")))]
#[cfg(feature = "burn")]
/// Compiled-graph adapter over burn tensors.
///
/// Burn tensors carry their rank in the type, so every input is handed to
/// the graph as a rank 2 `f32` tensor.
pub mod burn;

#[cfg_attr(docsrs, doc(cfg(feature = "onnx")))]
#[cfg(feature = "onnx")]
/// Interchange-format adapter over ONNX Runtime sessions.
pub mod onnx;

pub use core_trait::*;
pub use kind::BackendKind;

#[cfg(test)]
/// Mock adapter.
///
/// Scores simple arithmetic over `ndarray` and records the partitions it sees
pub(crate) mod mock_adapter;
