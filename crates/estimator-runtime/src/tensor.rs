//! # Host-side data
//!
//! Every prediction call enters and leaves the crate as [`HostArray`]s. Backend
//! adapters marshal them into engine-native tensors and back; the batch engine
//! only ever slices and concatenates them along [`constant::BATCH_DIM`].

pub mod constant;
mod array;
mod frame;

pub use array::HostArray;
pub use frame::{Frame, Inputs};
