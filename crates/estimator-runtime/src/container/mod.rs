//! # Prediction containers
//!
//! A [`Container`] pairs one converted model, bound to an execution engine
//! through an [`Adapter`], with a role that decides which of the classical
//! estimator methods it exposes:
//!
//! | role                | methods                                          |
//! |---------------------|--------------------------------------------------|
//! | [`Transformer`]     | `transform`                                      |
//! | [`Regressor`]       | `predict`                                        |
//! | [`Classifier`]      | `predict`, `predict_proba`                       |
//! | [`AnomalyDetector`] | `predict`, `decision_function`, `score_samples`  |
//!
//! Each method is a capability trait ([`Transforms`], [`Predicts`],
//! [`PredictsProba`], [`ScoresAnomalies`]) implemented for a container only
//! when its adapter supplies the matching primitive. Any adapter composes
//! with any role it has primitives for.
//!
//! Every public method resolves its [`Inputs`] once and then goes through the
//! container's [`BatchExecutor`].
//!
//! # Example
//!
//! ```ignore
//! let container: Container<CandleAdapter<MyGraph>, Classifier> =
//!     Container::new(graph, ContainerConfig::new().with_batch_size(1000), ExtraConfig::new())?;
//! let labels = container.predict(Inputs::single(features)).await?;
//! ```

mod core_trait;
mod role;

use std::marker::PhantomData;
use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::info;
use uuid::Uuid;
use crate::backend::Adapter;
use crate::config::{ContainerConfig, ExtraConfig, IFOREST_THRESHOLD, OFFSET};
use crate::core::{BatchExecutor, Partition};
use crate::error::Result;
use crate::tensor::{HostArray, Inputs};

pub use core_trait::*;
pub use role::*;

/// A converted model served through one backend adapter in one role.
pub struct Container<A, R> {
    id: Uuid,
    adapter: A,
    config: ContainerConfig,
    extra: ExtraConfig,
    executor: BatchExecutor,
    task: Task,
    _role: PhantomData<fn() -> R>,
}

impl<A, R> Container<A, R>
where
    A: Adapter,
    R: Role,
{
    /// Build the backend session for `model` eagerly.
    ///
    /// Fails when the configuration is invalid, the role flags conflict or the
    /// backend cannot be initialised.
    pub fn new(model: A::Model, config: ContainerConfig, extra: ExtraConfig) -> Result<Self> {
        config.validate()?;
        let task = R::task()?;
        let adapter = A::build(model, &config, &extra)?;
        let id = Uuid::new_v4();

        info!(
            container = %id,
            backend = A::NAME,
            role = R::NAME,
            batch_size = ?config.batch_size,
            n_threads = ?config.n_threads,
            "container ready"
        );

        Ok(Self {
            id,
            adapter,
            config,
            extra,
            executor: BatchExecutor::new(config.batch_size),
            task,
            _role: PhantomData,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn extra_config(&self) -> &ExtraConfig {
        &self.extra
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Resolve `inputs` and run `score` through the batch executor.
    pub async fn run<'a, F>(&self, score: F, inputs: Inputs, reshape: bool) -> Result<HostArray>
    where
        F: Fn(Vec<HostArray>, Partition) -> BoxFuture<'a, Result<HostArray>>,
    {
        let arrays = inputs.resolve()?;
        self.executor.run(score, arrays, reshape).await
    }
}

#[async_trait]
impl<A> Transforms for Container<A, Transformer>
where
    A: TransformPrimitive,
{
    async fn transform(&self, inputs: Inputs) -> Result<HostArray> {
        let adapter = &self.adapter;
        self.run(move |batch, partition| adapter.raw_transform(batch, partition), inputs, true)
            .await
    }
}

#[async_trait]
impl<A, R> Predicts for Container<A, R>
where
    A: PredictPrimitive,
    R: PredictingRole,
{
    async fn predict(&self, inputs: Inputs) -> Result<HostArray> {
        let adapter = &self.adapter;
        let task = self.task;
        let output = self
            .run(move |batch, partition| adapter.raw_predict(batch, partition, task), inputs, false)
            .await?;
        Ok(output.ravel())
    }
}

#[async_trait]
impl<A> PredictsProba for Container<A, Classifier>
where
    A: PredictProbaPrimitive,
{
    async fn predict_proba(&self, inputs: Inputs) -> Result<HostArray> {
        let adapter = &self.adapter;
        self.run(move |batch, partition| adapter.raw_predict_proba(batch, partition), inputs, true)
            .await
    }
}

#[async_trait]
impl<A> ScoresAnomalies for Container<A, AnomalyDetector>
where
    A: DecisionPrimitive,
{
    async fn decision_function(&self, inputs: Inputs) -> Result<HostArray> {
        let threshold = self.extra.f64(IFOREST_THRESHOLD)?;
        let adapter = &self.adapter;
        let scores = self
            .run(move |batch, partition| adapter.raw_decision_function(batch, partition), inputs, false)
            .await?
            .ravel();
        match threshold {
            Some(threshold) => scores.add_scalar(threshold),
            None => Ok(scores),
        }
    }

    async fn score_samples(&self, inputs: Inputs) -> Result<HostArray> {
        let offset = self
            .extra
            .require_f64(OFFSET, "score_samples adds the fitted offset to decision_function")?;
        self.decision_function(inputs).await?.add_scalar(offset)
    }
}
