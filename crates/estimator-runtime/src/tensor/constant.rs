/// # Constants with reserved meanings in estimator-runtime

/// In a given array shape, the `0th` dimension is always the row (batch) dimension
pub const BATCH_DIM: usize = 0;

/// In a two dimensional array, the `1st` dimension holds features or packed words
pub const FEATURE_DIM: usize = 1;

/// Width in bytes of one packed word of a fixed-width categorical encoding
pub const WORD_BYTES: usize = 4;
