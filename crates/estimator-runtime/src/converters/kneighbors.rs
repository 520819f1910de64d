use std::collections::BTreeMap;
use std::str::FromStr;
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use ndarray::Array2;
use tracing::debug;
use crate::backend::candle::TensorGraph;
use crate::backend::GraphOutput;
use crate::config::{ExtraConfig, BATCH_SIZE};
use crate::error::{Error, Result};

/// How neighbours are weighted when combining their targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weights {
    Uniform,
    /// Inverse distance.
    Distance,
}

impl FromStr for Weights {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uniform" => Ok(Weights::Uniform),
            "distance" => Ok(Weights::Distance),
            other => Err(Error::NotImplemented(format!(
                "k-nearest-neighbour weights '{other}'; supported: uniform, distance"
            ))),
        }
    }
}

/// Fitted training targets.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    /// Integer class labels, and the class index of every training row.
    Classes { classes: Vec<i64>, encoded: Vec<u32> },
    /// Regression targets, one per training row.
    Values(Vec<f32>),
}

/// The fitted state of a k-nearest-neighbour estimator.
#[derive(Debug, Clone)]
pub struct KNeighborsParams {
    pub train: Array2<f32>,
    pub targets: Targets,
    pub n_neighbors: usize,
    pub metric: String,
    pub metric_params: Option<BTreeMap<String, f64>>,
    pub weights: String,
}

impl KNeighborsParams {
    pub fn classifier(train: Array2<f32>, classes: Vec<i64>, encoded: Vec<u32>) -> Self {
        Self::new(train, Targets::Classes { classes, encoded })
    }

    pub fn regressor(train: Array2<f32>, values: Vec<f32>) -> Self {
        Self::new(train, Targets::Values(values))
    }

    fn new(train: Array2<f32>, targets: Targets) -> Self {
        Self {
            train,
            targets,
            n_neighbors: 5,
            metric: "minkowski".to_string(),
            metric_params: None,
            weights: "uniform".to_string(),
        }
    }

    pub fn with_neighbors(mut self, n_neighbors: usize) -> Self {
        self.n_neighbors = n_neighbors;
        self
    }

    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = metric.into();
        self
    }

    pub fn with_metric_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metric_params.get_or_insert_with(BTreeMap::new).insert(name.into(), value);
        self
    }

    pub fn with_weights(mut self, weights: impl Into<String>) -> Self {
        self.weights = weights.into();
        self
    }
}

#[derive(Debug)]
enum TargetTensors {
    /// Class labels `(classes,)` and per-row class index `(train,)`.
    Classes { labels: Tensor, encoded: Tensor, n_classes: usize },
    /// `(train,)`
    Values(Tensor),
}

/// A k-nearest-neighbour classifier or regressor as a tensor graph.
///
/// Queries are scored in chunks of the conversion batch size, each against
/// the full training set.
#[derive(Debug)]
pub struct KNeighborsModel {
    train: Tensor,
    targets: TargetTensors,
    n_neighbors: usize,
    p: f64,
    weights: Weights,
    batch_size: usize,
}

/// Convert a fitted k-nearest-neighbour estimator.
///
/// Requires [`BATCH_SIZE`] in `extra`.
pub fn convert_kneighbors(params: KNeighborsParams, extra: &ExtraConfig) -> Result<KNeighborsModel> {
    let batch_size = extra.require_usize(
        BATCH_SIZE,
        "k-nearest-neighbour models are converted for an explicit batch size",
    )?;

    let p = match params.metric.as_str() {
        "minkowski" => params
            .metric_params
            .as_ref()
            .and_then(|metric_params| metric_params.get("p").copied())
            .unwrap_or(2.0),
        "euclidean" => 2.0,
        other => {
            return Err(Error::NotImplemented(format!(
                "k-nearest-neighbour metric '{other}'; supported: minkowski, euclidean"
            )));
        }
    };
    if p <= 0.0 || !p.is_finite() {
        return Err(Error::Config(format!("minkowski power must be positive, got {p}")));
    }
    let weights: Weights = params.weights.parse()?;

    let (rows, features) = params.train.dim();
    if params.n_neighbors == 0 || params.n_neighbors > rows {
        return Err(Error::Config(format!(
            "n_neighbors must be between 1 and the {rows} training rows, got {}",
            params.n_neighbors
        )));
    }

    let device = Device::Cpu;
    let targets = match params.targets {
        Targets::Classes { classes, encoded } => {
            if encoded.len() != rows {
                return Err(Error::shape("k-nearest-neighbour class targets", rows, encoded.len()));
            }
            if let Some(bad) = encoded.iter().find(|idx| **idx as usize >= classes.len()) {
                return Err(Error::Config(format!(
                    "class index {bad} out of range for {} classes",
                    classes.len()
                )));
            }
            let n_classes = classes.len();
            TargetTensors::Classes {
                labels: Tensor::from_vec(classes, n_classes, &device)?,
                encoded: Tensor::from_vec(encoded, rows, &device)?,
                n_classes,
            }
        }
        Targets::Values(values) => {
            if values.len() != rows {
                return Err(Error::shape("k-nearest-neighbour regression targets", rows, values.len()));
            }
            TargetTensors::Values(Tensor::from_vec(values, rows, &device)?)
        }
    };

    let train = Tensor::from_vec(params.train.iter().copied().collect::<Vec<_>>(), (rows, features), &device)?;
    debug!(rows, features, n_neighbors = params.n_neighbors, p, weights = ?weights, batch_size, "k-nearest-neighbour model converted");

    Ok(KNeighborsModel {
        train,
        targets,
        n_neighbors: params.n_neighbors,
        p,
        weights,
        batch_size,
    })
}

impl KNeighborsModel {
    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn score_chunk(&self, chunk: &Tensor) -> Result<GraphOutput<Tensor>> {
        let k = self.n_neighbors;
        let rows = chunk.dim(0)?;

        // (chunk, train) minkowski distance raised to the power p
        let distances = chunk
            .unsqueeze(1)?
            .broadcast_sub(&self.train.unsqueeze(0)?)?
            .abs()?
            .powf(self.p)?
            .sum(2)?;
        let nearest = distances.arg_sort_last_dim(true)?.narrow(1, 0, k)?.contiguous()?;
        let nearest_distances = distances.gather(&nearest, 1)?;
        let weights = match self.weights {
            Weights::Uniform => nearest_distances.ones_like()?,
            Weights::Distance => nearest_distances.powf(1.0 / self.p)?.maximum(1e-12)?.recip()?,
        };
        let neighbours = nearest.flatten_all()?;

        match &self.targets {
            TargetTensors::Classes { labels, encoded, n_classes } => {
                let neighbour_classes = encoded.index_select(&neighbours, 0)?.reshape((rows, k, 1))?;
                let class_ids = Tensor::arange(0u32, *n_classes as u32, chunk.device())?.reshape((1, 1, *n_classes))?;
                let votes = neighbour_classes
                    .broadcast_eq(&class_ids)?
                    .to_dtype(DType::F32)?
                    .broadcast_mul(&weights.unsqueeze(2)?)?
                    .sum(1)?;
                let proba = votes.broadcast_div(&votes.sum_keepdim(1)?)?;
                let predicted = labels.index_select(&proba.argmax(1)?, 0)?;
                Ok(GraphOutput::Pair(predicted, proba))
            }
            TargetTensors::Values(values) => {
                let neighbour_values = values.index_select(&neighbours, 0)?.reshape((rows, k))?;
                let weighted = (neighbour_values * &weights)?.sum(1)?;
                Ok(GraphOutput::Single(weighted.broadcast_div(&weights.sum(1)?)?))
            }
        }
    }
}

#[async_trait]
impl TensorGraph for KNeighborsModel {
    async fn forward(&self, inputs: Vec<Tensor>) -> Result<GraphOutput<Tensor>> {
        let x = inputs
            .first()
            .ok_or_else(|| Error::shape("k-nearest-neighbour inputs", 1, 0))?
            .to_dtype(DType::F32)?;
        let rows = x.dim(0)?;
        if rows == 0 {
            return Err(Error::shape("k-nearest-neighbour queries", "at least one row", 0));
        }
        let x = x.reshape((rows, ()))?;

        let mut firsts = Vec::new();
        let mut seconds = Vec::new();
        for start in (0..rows).step_by(self.batch_size) {
            let len = self.batch_size.min(rows - start);
            match self.score_chunk(&x.narrow(0, start, len)?)? {
                GraphOutput::Single(values) => firsts.push(values),
                GraphOutput::Pair(labels, proba) => {
                    firsts.push(labels);
                    seconds.push(proba);
                }
            }
        }

        let first = Tensor::cat(&firsts, 0)?;
        if seconds.is_empty() {
            Ok(GraphOutput::Single(first))
        } else {
            Ok(GraphOutput::Pair(first, Tensor::cat(&seconds, 0)?))
        }
    }
}
