use async_trait::async_trait;
use crate::backend::Adapter;
use crate::core::Partition;
use crate::error::Result;
use crate::tensor::{HostArray, Inputs};
use super::Task;

/// Backend primitive behind [`Transforms::transform`].
///
/// Receives one partition worth of positional inputs and returns the raw
/// graph output; the container reshapes it.
#[async_trait]
pub trait TransformPrimitive: Adapter {
    async fn raw_transform(&self, inputs: Vec<HostArray>, partition: Partition) -> Result<HostArray>;
}

/// Backend primitive behind [`Predicts::predict`].
///
/// `task` decides which graph output holds the prediction: the only one for
/// regression, the first (labels) for classification and anomaly detection.
#[async_trait]
pub trait PredictPrimitive: Adapter {
    async fn raw_predict(&self, inputs: Vec<HostArray>, partition: Partition, task: Task) -> Result<HostArray>;
}

/// Backend primitive behind [`PredictsProba::predict_proba`], the second graph output.
#[async_trait]
pub trait PredictProbaPrimitive: PredictPrimitive {
    async fn raw_predict_proba(&self, inputs: Vec<HostArray>, partition: Partition) -> Result<HostArray>;
}

/// Backend primitive behind [`ScoresAnomalies::decision_function`], the second graph output.
#[async_trait]
pub trait DecisionPrimitive: PredictPrimitive {
    async fn raw_decision_function(&self, inputs: Vec<HostArray>, partition: Partition) -> Result<HostArray>;
}

/// Feature transformation, output shaped `(N, -1)`.
#[async_trait]
pub trait Transforms {
    async fn transform(&self, inputs: Inputs) -> Result<HostArray>;
}

/// Point predictions, always a flat array of `N` values.
///
/// Regression values, class labels, or `{-1, 1}` anomaly labels depending
/// on the container role.
#[async_trait]
pub trait Predicts {
    async fn predict(&self, inputs: Inputs) -> Result<HostArray>;
}

/// Class probabilities shaped `(N, n_classes)`.
#[async_trait]
pub trait PredictsProba: Predicts {
    async fn predict_proba(&self, inputs: Inputs) -> Result<HostArray>;
}

/// Anomaly scoring.
#[async_trait]
pub trait ScoresAnomalies: Predicts {
    /// Raw anomaly scores, shifted by `iforest_threshold` when it is configured.
    async fn decision_function(&self, inputs: Inputs) -> Result<HostArray>;

    /// `decision_function(inputs) + offset`. Fails without running the model
    /// when `offset` is not configured.
    async fn score_samples(&self, inputs: Inputs) -> Result<HostArray>;
}
