//! # Batch execution
//!
//! The core module drives every prediction call of a container through its
//! backend's scoring function.
//!
//! ## Module Structure
//!
//! * [`batch`] - Row partitioning and the [`BatchExecutor`](batch::BatchExecutor).
//!   With no batch size configured, or when the input has exactly
//!   `batch_size` rows, the scoring function runs once over the whole input.
//!   Otherwise the input is cut into contiguous partitions that are scored
//!   sequentially and concatenated back in order.
//!
//! Partitioning never changes results: the concatenation of partition outputs
//! equals the single-shot output for any batch size.
pub mod batch;

pub use batch::{partitions, BatchExecutor, Partition};
