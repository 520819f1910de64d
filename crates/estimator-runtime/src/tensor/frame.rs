use super::array::HostArray;
use crate::error::{Error, Result};

/// A column-oriented tabular frame: an ordered list of named 1-D columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<(String, HostArray)>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, keeping insertion order.
    pub fn with_column(mut self, name: impl Into<String>, values: impl Into<HostArray>) -> Self {
        self.columns.push((name.into(), values.into()));
        self
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Split into one `(N, 1)` column vector per column, in column order.
    pub fn into_column_vectors(self) -> Result<Vec<HostArray>> {
        self.columns
            .into_iter()
            .map(|(_, values)| {
                let rows = values.len();
                values.ravel().reshape_rows(rows)
            })
            .collect()
    }
}

/// The closed set of input representations accepted by every prediction method.
///
/// Resolved exactly once per call by [`Inputs::resolve`], before any batching.
#[derive(Debug, Clone, PartialEq)]
pub enum Inputs {
    /// One or more positional arrays with equal leading dimension.
    Arrays(Vec<HostArray>),
    /// A tabular frame, split into one positional array per column.
    Frame(Frame),
}

impl Inputs {
    /// A single positional array.
    pub fn single(array: impl Into<HostArray>) -> Self {
        Inputs::Arrays(vec![array.into()])
    }

    /// Normalise into positional arrays and check that they share one row count.
    pub fn resolve(self) -> Result<Vec<HostArray>> {
        let arrays = match self {
            Inputs::Arrays(arrays) => arrays,
            Inputs::Frame(frame) => frame.into_column_vectors()?,
        };

        let Some(first) = arrays.first() else {
            return Err(Error::shape("prediction inputs", "at least one input", "none"));
        };
        let rows = first
            .rows()
            .ok_or_else(|| Error::shape("input 0", "an array with a row dimension", "a 0-d array"))?;

        for (position, array) in arrays.iter().enumerate().skip(1) {
            match array.rows() {
                Some(other) if other == rows => {}
                Some(other) => {
                    return Err(Error::shape(format!("input {position} rows"), rows, other));
                }
                None => {
                    return Err(Error::shape(
                        format!("input {position}"),
                        "an array with a row dimension",
                        "a 0-d array",
                    ));
                }
            }
        }
        Ok(arrays)
    }
}

impl From<HostArray> for Inputs {
    fn from(value: HostArray) -> Self {
        Inputs::Arrays(vec![value])
    }
}

impl From<Vec<HostArray>> for Inputs {
    fn from(value: Vec<HostArray>) -> Self {
        Inputs::Arrays(value)
    }
}

impl From<Frame> for Inputs {
    fn from(value: Frame) -> Self {
        Inputs::Frame(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_frame_splits_into_column_vectors() {
        let frame = Frame::new()
            .with_column("a", arr1(&[1.0f32, 2.0, 3.0]))
            .with_column("b", arr1(&[4i64, 5, 6]));
        assert_eq!(frame.column_names(), vec!["a", "b"]);

        let arrays = Inputs::from(frame).resolve().unwrap();

        assert_eq!(arrays.len(), 2);
        assert_eq!(arrays[0], HostArray::from(arr2(&[[1.0f32], [2.0], [3.0]])));
        assert_eq!(arrays[1].shape(), &[3, 1]);
    }

    #[test]
    fn test_resolve_rejects_mismatched_rows() {
        let inputs = Inputs::Arrays(vec![
            HostArray::from(arr2(&[[1.0f32], [2.0]])),
            HostArray::from(arr2(&[[1.0f32]])),
        ]);

        match inputs.resolve() {
            Err(Error::ShapeMismatch { context, expected, actual }) => {
                assert_eq!(context, "input 1 rows");
                assert_eq!(expected, "2");
                assert_eq!(actual, "1");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_resolve_rejects_empty_inputs() {
        assert!(Inputs::Arrays(vec![]).resolve().is_err());
    }
}
