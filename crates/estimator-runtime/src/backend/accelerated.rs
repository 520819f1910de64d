//! Execution of ahead-of-time compiled modules.
//!
//! Modules compiled against a fixed batch shape cannot score the shorter
//! final partition of a batched call. A second module compiled for that
//! remainder can be supplied under [`REMAINDER_MODEL`]; it replaces the
//! primary module for the last partition only.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use async_trait::async_trait;
use tracing::{debug, warn};
use super::{map_positional, Adapter, CompiledModule};
use crate::config::{
    ContainerConfig, ExecutionContext, ExtraConfig, COMPILED_NUM_THREADS_ENV, CONTEXT,
    INPUT_NAMES, REMAINDER_MODEL,
};
use crate::container::{
    DecisionPrimitive, PredictPrimitive, PredictProbaPrimitive, Task, TransformPrimitive,
};
use crate::core::Partition;
use crate::error::{Error, Result};
use crate::tensor::HostArray;

const NAME: &str = "accelerated";

/// Output index of values, labels or transformed features.
const PRIMARY_OUTPUT: usize = 0;

/// Output index of probabilities or anomaly scores.
const SECONDARY_OUTPUT: usize = 1;

/// Guards every read and write of [`COMPILED_NUM_THREADS_ENV`] made by this crate.
static THREAD_ENV: Mutex<()> = Mutex::new(());

fn thread_env_lock() -> MutexGuard<'static, ()> {
    THREAD_ENV.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exports the thread count for the compiled runtime, skipping the write when
/// it already holds `n_threads`.
fn export_thread_count(n_threads: usize) {
    let value = n_threads.to_string();
    let _guard = thread_env_lock();
    if std::env::var(COMPILED_NUM_THREADS_ENV).is_ok_and(|current| current == value) {
        return;
    }
    // SAFETY: writes made by this crate are serialised by `THREAD_ENV`. The
    // remaining precondition is on the caller: no other thread may read or
    // write the process environment outside this lock while containers over
    // this adapter are being built.
    unsafe { std::env::set_var(COMPILED_NUM_THREADS_ENV, value) };
}

/// Runs a [`CompiledModule`] on a precomputed [`ExecutionContext`].
///
/// Building the adapter exports the thread count to the process environment
/// under [`COMPILED_NUM_THREADS_ENV`]. Callers must not read or write the
/// environment from other threads while containers over this adapter are
/// being built.
pub struct AcceleratedAdapter {
    module: Arc<dyn CompiledModule>,
    remainder: Option<Arc<dyn CompiledModule>>,
    context: ExecutionContext,
    input_names: Vec<String>,
    n_threads: usize,
    batch_size: Option<usize>,
}

impl AcceleratedAdapter {
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    pub fn has_remainder(&self) -> bool {
        self.remainder.is_some()
    }

    /// The remainder module scores the final partition of a partitioned call
    /// when it is shorter than the batch size.
    fn module_for(&self, partition: &Partition) -> &Arc<dyn CompiledModule> {
        let short = partition.is_last && self.batch_size.is_some_and(|size| partition.len() < size);
        match (&self.remainder, short) {
            (Some(remainder), true) => {
                debug!(rows = partition.len(), "scoring final partition with the remainder module");
                remainder
            }
            (None, true) => {
                warn!(
                    rows = partition.len(),
                    batch_size = ?self.batch_size,
                    "final partition is shorter than the batch size and no remainder module is configured"
                );
                &self.module
            }
            _ => &self.module,
        }
    }

    async fn score(&self, inputs: Vec<HostArray>, partition: Partition, output: usize) -> Result<HostArray> {
        let module = self.module_for(&partition);
        let named = map_positional(&self.input_names, inputs, false)?;
        let mut outputs = module.run(&self.context, named).await?;
        if output >= outputs.len() {
            return Err(Error::shape(
                format!("{NAME} module output {output}"),
                format!("at least {} outputs", output + 1),
                outputs.len(),
            ));
        }
        Ok(outputs.swap_remove(output))
    }
}

impl Adapter for AcceleratedAdapter {
    type Model = Arc<dyn CompiledModule>;
    const NAME: &'static str = NAME;

    fn build(module: Self::Model, config: &ContainerConfig, extra: &ExtraConfig) -> Result<Self> {
        let context = extra.require_context(CONTEXT, "compiled modules run on a precomputed execution context")?;
        let input_names = extra
            .require_names(INPUT_NAMES, "compiled modules take their inputs by name")?
            .to_vec();
        let remainder = extra.module(REMAINDER_MODEL)?;
        let n_threads = match config.n_threads {
            Some(n_threads) => n_threads,
            None => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
        };
        export_thread_count(n_threads);

        debug!(
            context = ?context,
            inputs = ?input_names,
            remainder = remainder.is_some(),
            n_threads,
            "compiled module loaded"
        );

        Ok(Self {
            module,
            remainder,
            context,
            input_names,
            n_threads,
            batch_size: config.batch_size,
        })
    }
}

#[async_trait]
impl TransformPrimitive for AcceleratedAdapter {
    async fn raw_transform(&self, inputs: Vec<HostArray>, partition: Partition) -> Result<HostArray> {
        self.score(inputs, partition, PRIMARY_OUTPUT).await
    }
}

#[async_trait]
impl PredictPrimitive for AcceleratedAdapter {
    async fn raw_predict(&self, inputs: Vec<HostArray>, partition: Partition, _task: Task) -> Result<HostArray> {
        Ok(self.score(inputs, partition, PRIMARY_OUTPUT).await?.ravel())
    }
}

#[async_trait]
impl PredictProbaPrimitive for AcceleratedAdapter {
    async fn raw_predict_proba(&self, inputs: Vec<HostArray>, partition: Partition) -> Result<HostArray> {
        self.score(inputs, partition, SECONDARY_OUTPUT).await
    }
}

#[async_trait]
impl DecisionPrimitive for AcceleratedAdapter {
    async fn raw_decision_function(&self, inputs: Vec<HostArray>, partition: Partition) -> Result<HostArray> {
        Ok(self.score(inputs, partition, SECONDARY_OUTPUT).await?.ravel())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use ndarray::{Array2, Axis};
    use crate::container::{AnomalyDetector, Container, Predicts, Regressor, ScoresAnomalies};
    use crate::config::OFFSET;
    use crate::tensor::Inputs;

    /// Row sums (output 0) and negated row sums (output 1), for a fixed row count if set.
    struct RowSums {
        rows: Option<usize>,
        runs: AtomicUsize,
    }

    impl RowSums {
        fn new(rows: Option<usize>) -> Arc<Self> {
            Arc::new(Self { rows, runs: AtomicUsize::new(0) })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompiledModule for RowSums {
        async fn run(&self, _context: &ExecutionContext, inputs: Vec<(String, HostArray)>) -> Result<Vec<HostArray>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let (_, x) = &inputs[0];
            let x = x.to_f32(0, "row_sums")?.into_dimensionality::<ndarray::Ix2>()?;
            if let Some(rows) = self.rows {
                if x.nrows() != rows {
                    return Err(Error::shape("compiled batch rows", rows, x.nrows()));
                }
            }
            let sums = x.sum_axis(Axis(1));
            Ok(vec![HostArray::from(sums.clone()), HostArray::from(sums.mapv(|v| -v))])
        }
    }

    fn extra() -> ExtraConfig {
        ExtraConfig::new()
            .with(CONTEXT, ExecutionContext::cpu())
            .with(INPUT_NAMES, vec!["x".to_string()])
    }

    fn features(rows: usize) -> Inputs {
        Inputs::single(Array2::from_shape_fn((rows, 2), |(r, _)| r as f32))
    }

    fn regressor(
        primary: &Arc<RowSums>,
        remainder: Option<&Arc<RowSums>>,
        config: ContainerConfig,
    ) -> Container<AcceleratedAdapter, Regressor> {
        let mut extra = extra();
        if let Some(remainder) = remainder {
            extra.insert(REMAINDER_MODEL, remainder.clone() as Arc<dyn CompiledModule>);
        }
        Container::new(primary.clone() as Arc<dyn CompiledModule>, config, extra).unwrap()
    }

    #[test]
    fn test_requires_context_and_input_names() {
        let module = RowSums::new(None) as Arc<dyn CompiledModule>;

        let no_context = ExtraConfig::new().with(INPUT_NAMES, vec!["x".to_string()]);
        match AcceleratedAdapter::build(module.clone(), &ContainerConfig::new(), &no_context) {
            Err(Error::MissingConfig { key, .. }) => assert_eq!(key, CONTEXT),
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("built without a context"),
        }

        let no_names = ExtraConfig::new().with(CONTEXT, ExecutionContext::cpu());
        match AcceleratedAdapter::build(module, &ContainerConfig::new(), &no_names) {
            Err(Error::MissingConfig { key, .. }) => assert_eq!(key, INPUT_NAMES),
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("built without input names"),
        }
    }

    #[test]
    fn test_thread_count_defaults_to_available_parallelism() {
        let adapter =
            AcceleratedAdapter::build(RowSums::new(None), &ContainerConfig::new(), &extra()).unwrap();

        assert!(adapter.n_threads() >= 1);
        let _guard = thread_env_lock();
        let exported: usize = std::env::var(COMPILED_NUM_THREADS_ENV).unwrap().parse().unwrap();
        assert!(exported >= 1);
    }

    #[tokio::test]
    async fn test_remainder_used_for_last_partition_only() {
        let primary = RowSums::new(Some(30));
        let remainder = RowSums::new(Some(10));
        let container = regressor(&primary, Some(&remainder), ContainerConfig::new().with_batch_size(30));

        let output = container.predict(features(100)).await.unwrap();

        assert_eq!(output.shape(), &[100]);
        assert_eq!(output.slice_rows(99, 100), HostArray::from(ndarray::arr1(&[198.0f32])));
        assert_eq!(primary.runs(), 3);
        assert_eq!(remainder.runs(), 1);
    }

    #[tokio::test]
    async fn test_even_partitions_skip_remainder() {
        let primary = RowSums::new(Some(30));
        let remainder = RowSums::new(Some(10));
        let container = regressor(&primary, Some(&remainder), ContainerConfig::new().with_batch_size(30));

        container.predict(features(90)).await.unwrap();
        container.predict(features(30)).await.unwrap();

        assert_eq!(primary.runs(), 4);
        assert_eq!(remainder.runs(), 0);
    }

    #[tokio::test]
    async fn test_missing_remainder_fails_on_short_partition() {
        let primary = RowSums::new(Some(30));
        let container = regressor(&primary, None, ContainerConfig::new().with_batch_size(30));

        let result = container.predict(features(100)).await;

        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
        assert_eq!(primary.runs(), 4);
    }

    #[tokio::test]
    async fn test_input_count_must_match_names() {
        let primary = RowSums::new(None);
        let container = regressor(&primary, None, ContainerConfig::new());
        let inputs = Inputs::Arrays(vec![
            HostArray::from(Array2::<f32>::zeros((2, 1))),
            HostArray::from(Array2::<f32>::zeros((2, 1))),
        ]);

        assert!(matches!(container.predict(inputs).await, Err(Error::ShapeMismatch { .. })));
        assert_eq!(primary.runs(), 0);
    }

    #[tokio::test]
    async fn test_secondary_output_feeds_scores() {
        let primary = RowSums::new(None);
        let detector: Container<AcceleratedAdapter, AnomalyDetector> = Container::new(
            primary.clone() as Arc<dyn CompiledModule>,
            ContainerConfig::new(),
            extra().with(OFFSET, 1.0),
        )
        .unwrap();

        let scores = detector.score_samples(features(3)).await.unwrap();

        assert_eq!(scores, HostArray::from(ndarray::arr1(&[1.0f32, -1.0, -3.0])));
    }
}
