use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use crate::backend::candle::TensorGraph;
use crate::backend::GraphOutput;
use crate::error::{Error, Result};

/// The marker a [`SimpleImputer`] treats as missing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MissingValue {
    NaN,
    Value(f64),
}

/// Replaces missing entries of every column with that column's fitted statistic.
#[derive(Debug)]
pub struct SimpleImputer {
    missing: MissingValue,
    /// `(1, features)`
    statistics: Tensor,
    features: usize,
}

impl SimpleImputer {
    pub fn new(statistics: &[f32], missing: MissingValue) -> Result<Self> {
        let features = statistics.len();
        let statistics = Tensor::from_vec(statistics.to_vec(), (1, features), &Device::Cpu)?;
        Ok(Self { missing, statistics, features })
    }
}

#[async_trait]
impl TensorGraph for SimpleImputer {
    async fn forward(&self, inputs: Vec<Tensor>) -> Result<GraphOutput<Tensor>> {
        let x = inputs
            .first()
            .ok_or_else(|| Error::shape("imputer inputs", 1, 0))?
            .to_dtype(DType::F32)?;
        let rows = x.dim(0)?;
        let x = x.reshape((rows, ()))?;
        if x.dim(1)? != self.features {
            return Err(Error::shape("imputer input columns", self.features, x.dim(1)?));
        }

        let mask = match self.missing {
            // only NaN differs from itself
            MissingValue::NaN => x.ne(&x)?,
            MissingValue::Value(value) => x.eq(value)?,
        };
        let fill = self.statistics.broadcast_as(x.shape())?;
        Ok(GraphOutput::Single(mask.where_cond(&fill, &x)?))
    }
}
