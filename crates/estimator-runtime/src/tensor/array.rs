use ndarray::{Array, Array1, ArrayD, Axis, Dimension, IxDyn, Slice};
use super::constant::{BATCH_DIM, FEATURE_DIM};
use crate::error::{Error, Result};

/// A dynamically ranked host array in one of the element types a converted
/// model can consume or produce.
///
/// Numeric arrays move freely between backends; `Str` only exists so that
/// callers get a precise error naming the offending input when a backend
/// cannot take strings.
#[derive(Debug, Clone, PartialEq)]
pub enum HostArray {
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    I64(ArrayD<i64>),
    I32(ArrayD<i32>),
    U32(ArrayD<u32>),
    Str(ArrayD<String>),
}

/// Evaluate `$body` with `$inner` bound to the wrapped array, whatever its element type.
macro_rules! with_array {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            HostArray::F32($inner) => $body,
            HostArray::F64($inner) => $body,
            HostArray::I64($inner) => $body,
            HostArray::I32($inner) => $body,
            HostArray::U32($inner) => $body,
            HostArray::Str($inner) => $body,
        }
    };
}

/// Like [`with_array`], but re-wraps the resulting array in the same variant.
macro_rules! map_array {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            HostArray::F32($inner) => HostArray::F32($body),
            HostArray::F64($inner) => HostArray::F64($body),
            HostArray::I64($inner) => HostArray::I64($body),
            HostArray::I32($inner) => HostArray::I32($body),
            HostArray::U32($inner) => HostArray::U32($body),
            HostArray::Str($inner) => HostArray::Str($body),
        }
    };
}

/// Concatenate flattened parts that must all share the `$variant` element type.
macro_rules! concat_variant {
    ($variant:ident, $kind:expr, $first:expr, $rest:expr) => {{
        let mut values: Vec<_> = $first.iter().cloned().collect();
        for (idx, part) in $rest.enumerate() {
            match part {
                HostArray::$variant(a) => values.extend(a.iter().cloned()),
                other => {
                    return Err(Error::shape(
                        format!("concatenating partition {} output", idx + 1),
                        $kind,
                        other.kind(),
                    ))
                }
            }
        }
        HostArray::$variant(Array1::from_vec(values).into_dyn())
    }};
}

macro_rules! impl_from_array {
    ($elem:ty, $variant:ident) => {
        impl<D: Dimension> From<Array<$elem, D>> for HostArray {
            fn from(value: Array<$elem, D>) -> Self {
                HostArray::$variant(value.into_dyn())
            }
        }
    };
}

impl_from_array!(f32, F32);
impl_from_array!(f64, F64);
impl_from_array!(i64, I64);
impl_from_array!(i32, I32);
impl_from_array!(u32, U32);
impl_from_array!(String, Str);

impl HostArray {
    /// Name of the element type, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            HostArray::F32(_) => "f32",
            HostArray::F64(_) => "f64",
            HostArray::I64(_) => "i64",
            HostArray::I32(_) => "i32",
            HostArray::U32(_) => "u32",
            HostArray::Str(_) => "string",
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_array!(self, a => a.shape())
    }

    pub fn len(&self) -> usize {
        with_array!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the leading dimension, `None` for a 0-d array.
    pub fn rows(&self) -> Option<usize> {
        self.shape().get(BATCH_DIM).copied()
    }

    /// Copy out the rows `[start, end)`.
    pub fn slice_rows(&self, start: usize, end: usize) -> HostArray {
        map_array!(self, a => a.slice_axis(Axis(BATCH_DIM), Slice::from(start..end)).to_owned())
    }

    /// Flatten into a 1-D array in logical (row-major) order.
    pub fn ravel(self) -> HostArray {
        map_array!(self, a => Array1::from_iter(a.iter().cloned()).into_dyn())
    }

    /// Reshape to `(rows, -1)`.
    pub fn reshape_rows(self, rows: usize) -> Result<HostArray> {
        let len = self.len();
        let width = if rows == 0 {
            self.shape().iter().skip(1).product::<usize>()
        } else {
            len / rows
        };
        if rows * width != len {
            return Err(Error::shape(
                format!("reshaping {len} values to ({rows}, -1)"),
                format!("a multiple of {rows} values"),
                len,
            ));
        }
        let shape = IxDyn(&[rows, width]);
        Ok(with_array!(self, a => {
            let values: Vec<_> = a.iter().cloned().collect();
            HostArray::from(ArrayD::from_shape_vec(shape, values)?)
        }))
    }

    /// Split a 2-D array into one `(rows, 1)` array per column.
    pub fn split_columns(&self) -> Result<Vec<HostArray>> {
        let shape = self.shape();
        if shape.len() != 2 {
            return Err(Error::shape("unpacking a packed input", "a 2-D array", format!("shape {shape:?}")));
        }
        Ok((0..shape[FEATURE_DIM])
            .map(|column| {
                map_array!(self, a => a
                    .index_axis(Axis(FEATURE_DIM), column)
                    .insert_axis(Axis(FEATURE_DIM))
                    .to_owned())
            })
            .collect())
    }

    /// Concatenate the flattened `parts`, which must share one element type.
    pub fn concat_flat(parts: Vec<HostArray>) -> Result<HostArray> {
        let mut iter = parts.into_iter();
        let Some(first) = iter.next() else {
            return Ok(HostArray::F32(ArrayD::zeros(IxDyn(&[0]))));
        };
        let kind = first.kind();
        Ok(match first {
            HostArray::F32(a) => concat_variant!(F32, kind, a, iter),
            HostArray::F64(a) => concat_variant!(F64, kind, a, iter),
            HostArray::I64(a) => concat_variant!(I64, kind, a, iter),
            HostArray::I32(a) => concat_variant!(I32, kind, a, iter),
            HostArray::U32(a) => concat_variant!(U32, kind, a, iter),
            HostArray::Str(a) => concat_variant!(Str, kind, a, iter),
        })
    }

    /// Add `value` to every element.
    ///
    /// Floating point arrays keep their type, integer arrays promote to `f64`.
    pub fn add_scalar(self, value: f64) -> Result<HostArray> {
        Ok(match self {
            HostArray::F32(a) => HostArray::F32(a.mapv(|x| x + value as f32)),
            HostArray::F64(a) => HostArray::F64(a.mapv(|x| x + value)),
            HostArray::I64(a) => HostArray::F64(a.mapv(|x| x as f64 + value)),
            HostArray::I32(a) => HostArray::F64(a.mapv(|x| f64::from(x) + value)),
            HostArray::U32(a) => HostArray::F64(a.mapv(|x| f64::from(x) + value)),
            HostArray::Str(_) => {
                return Err(Error::NonNumeric { operation: "add_scalar", kind: "string" })
            }
        })
    }

    /// Convert to `f32`, the numeric type of float-only engines.
    ///
    /// `position` and `backend` only feed the error raised for string input.
    pub fn to_f32(&self, position: usize, backend: &'static str) -> Result<ArrayD<f32>> {
        Ok(match self {
            HostArray::F32(a) => a.clone(),
            HostArray::F64(a) => a.mapv(|x| x as f32),
            HostArray::I64(a) => a.mapv(|x| x as f32),
            HostArray::I32(a) => a.mapv(|x| x as f32),
            HostArray::U32(a) => a.mapv(|x| x as f32),
            HostArray::Str(_) => {
                return Err(Error::UnsupportedInput { position, kind: "string", backend })
            }
        })
    }

    pub fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match self {
            HostArray::F32(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&ArrayD<f64>> {
        match self {
            HostArray::F64(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&ArrayD<i64>> {
        match self {
            HostArray::I64(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<&ArrayD<u32>> {
        match self {
            HostArray::U32(a) => Some(a),
            _ => None,
        }
    }
}
