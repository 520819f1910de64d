//! The burn binding for compiled graphs.
//! Burn tensors are constrained with a const generic rank, so graphs are
//! written against rank 2 `f32` tensors of shape `(rows, features)`.
use std::marker::PhantomData;
use async_trait::async_trait;
use burn::prelude::{Backend as BurnBackend, Tensor};
use burn::tensor::TensorData;
use ndarray::{ArrayD, IxDyn};
use tracing::debug;
use super::{Adapter, GraphOutput};
use crate::config::{ContainerConfig, ExtraConfig};
use crate::container::{
    DecisionPrimitive, PredictPrimitive, PredictProbaPrimitive, Task, TransformPrimitive,
};
use crate::core::Partition;
use crate::error::{Error, Result};
use crate::tensor::HostArray;

const NAME: &str = "burn";

/// A converted model compiled over a burn backend `B`.
pub trait CompiledGraph<B: BurnBackend>: Send + Sync {
    /// Device the graph was compiled for; inputs are moved there on every call.
    fn device(&self) -> B::Device;

    fn forward(&self, inputs: Vec<Tensor<B, 2>>) -> Result<GraphOutput<Tensor<B, 2>>>;
}

/// Flatten trailing dimensions and normalise to `f32`.
fn to_tensor<B: BurnBackend>(array: &HostArray, position: usize, device: &B::Device) -> Result<Tensor<B, 2>> {
    let values = array.to_f32(position, NAME)?;
    let rows = values.shape().first().copied().unwrap_or(1);
    let columns = if rows == 0 {
        values.shape().iter().skip(1).product()
    } else {
        values.len() / rows
    };
    let data = TensorData::new(values.iter().copied().collect::<Vec<f32>>(), [rows, columns]);
    Ok(Tensor::from_data(data, device))
}

fn from_tensor<B: BurnBackend>(tensor: Tensor<B, 2>) -> Result<HostArray> {
    let data = tensor.into_data().convert::<f32>();
    let shape = data.shape.clone();
    let values = data
        .to_vec::<f32>()
        .map_err(|e| Error::Backend { backend: NAME, message: format!("{e:?}") })?;
    Ok(HostArray::from(ArrayD::from_shape_vec(IxDyn(&shape), values)?))
}

/// Runs a [`CompiledGraph`] on burn backend `B`.
pub struct BurnAdapter<B, G> {
    graph: G,
    _backend: PhantomData<fn() -> B>,
}

impl<B, G> BurnAdapter<B, G>
where
    B: BurnBackend,
    G: CompiledGraph<B>,
{
    fn execute(&self, inputs: Vec<HostArray>) -> Result<GraphOutput<Tensor<B, 2>>> {
        let device = self.graph.device();
        let tensors = inputs
            .iter()
            .enumerate()
            .map(|(position, input)| to_tensor::<B>(input, position, &device))
            .collect::<Result<Vec<_>>>()?;
        self.graph.forward(tensors)
    }
}

impl<B, G> Adapter for BurnAdapter<B, G>
where
    B: BurnBackend,
    G: CompiledGraph<B>,
{
    type Model = G;
    const NAME: &'static str = NAME;

    fn build(graph: G, config: &ContainerConfig, _extra: &ExtraConfig) -> Result<Self> {
        debug!(device = ?graph.device(), n_threads = ?config.n_threads, "burn graph bound");
        Ok(Self { graph, _backend: PhantomData })
    }
}

#[async_trait]
impl<B, G> TransformPrimitive for BurnAdapter<B, G>
where
    B: BurnBackend,
    G: CompiledGraph<B>,
{
    async fn raw_transform(&self, inputs: Vec<HostArray>, _partition: Partition) -> Result<HostArray> {
        from_tensor(self.execute(inputs)?.single(NAME)?)
    }
}

#[async_trait]
impl<B, G> PredictPrimitive for BurnAdapter<B, G>
where
    B: BurnBackend,
    G: CompiledGraph<B>,
{
    async fn raw_predict(&self, inputs: Vec<HostArray>, _partition: Partition, task: Task) -> Result<HostArray> {
        Ok(from_tensor(self.execute(inputs)?.prediction(task, NAME)?)?.ravel())
    }
}

#[async_trait]
impl<B, G> PredictProbaPrimitive for BurnAdapter<B, G>
where
    B: BurnBackend,
    G: CompiledGraph<B>,
{
    async fn raw_predict_proba(&self, inputs: Vec<HostArray>, _partition: Partition) -> Result<HostArray> {
        from_tensor(self.execute(inputs)?.nth(1, NAME)?)
    }
}

#[async_trait]
impl<B, G> DecisionPrimitive for BurnAdapter<B, G>
where
    B: BurnBackend,
    G: CompiledGraph<B>,
{
    async fn raw_decision_function(&self, inputs: Vec<HostArray>, _partition: Partition) -> Result<HostArray> {
        Ok(from_tensor(self.execute(inputs)?.nth(1, NAME)?)?.ravel())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::backend::ndarray::NdArrayDevice;
    use ndarray::{arr1, arr2, Array3};
    use crate::container::{Classifier, Container, Predicts, PredictsProba, Regressor, Transformer, Transforms};
    use crate::tensor::Inputs;

    type TestBackend = NdArray;

    /// Concatenates all inputs along the feature axis.
    struct Stack;

    impl CompiledGraph<TestBackend> for Stack {
        fn device(&self) -> NdArrayDevice {
            NdArrayDevice::Cpu
        }

        fn forward(&self, inputs: Vec<Tensor<TestBackend, 2>>) -> Result<GraphOutput<Tensor<TestBackend, 2>>> {
            Ok(GraphOutput::Single(Tensor::cat(inputs, 1)))
        }
    }

    /// Row sums; row-normalised probabilities with arg-max labels when `classify`.
    struct Sums {
        classify: bool,
    }

    impl CompiledGraph<TestBackend> for Sums {
        fn device(&self) -> NdArrayDevice {
            NdArrayDevice::Cpu
        }

        fn forward(&self, inputs: Vec<Tensor<TestBackend, 2>>) -> Result<GraphOutput<Tensor<TestBackend, 2>>> {
            let x = inputs[0].clone();
            let sums = x.clone().sum_dim(1);
            if !self.classify {
                return Ok(GraphOutput::Single(sums));
            }
            let proba = x.div(sums);
            let labels = proba.clone().argmax(1).float();
            Ok(GraphOutput::Pair(labels, proba))
        }
    }

    #[tokio::test]
    async fn test_regressor_predict() {
        let regressor: Container<BurnAdapter<TestBackend, Sums>, Regressor> = Container::new(
            Sums { classify: false },
            ContainerConfig::new().with_batch_size(2),
            ExtraConfig::new(),
        )
        .unwrap();

        let output = regressor
            .predict(Inputs::single(arr2(&[[1i64, 2], [3, 4], [5, 6]])))
            .await
            .unwrap();

        assert_eq!(output, HostArray::from(arr1(&[3.0f32, 7.0, 11.0])));
    }

    #[tokio::test]
    async fn test_classifier_outputs() {
        let classifier: Container<BurnAdapter<TestBackend, Sums>, Classifier> =
            Container::new(Sums { classify: true }, ContainerConfig::new(), ExtraConfig::new()).unwrap();
        let x = arr2(&[[1.0f64, 3.0], [2.0, 0.0]]);

        let labels = classifier.predict(Inputs::single(x.clone())).await.unwrap();
        let proba = classifier.predict_proba(Inputs::single(x)).await.unwrap();

        assert_eq!(labels, HostArray::from(arr1(&[1.0f32, 0.0])));
        assert_eq!(proba, HostArray::from(arr2(&[[0.25f32, 0.75], [1.0, 0.0]])));
    }

    #[tokio::test]
    async fn test_trailing_dims_are_flattened() {
        let transformer: Container<BurnAdapter<TestBackend, Stack>, Transformer> =
            Container::new(Stack, ContainerConfig::new(), ExtraConfig::new()).unwrap();
        let cube = Array3::from_shape_fn((2, 2, 2), |(r, i, j)| (r * 4 + i * 2 + j) as f32);
        let column = arr2(&[[10.0f32], [20.0]]);

        let output = transformer
            .transform(Inputs::Arrays(vec![HostArray::from(cube), HostArray::from(column)]))
            .await
            .unwrap();

        assert_eq!(
            output,
            HostArray::from(arr2(&[[0.0f32, 1.0, 2.0, 3.0, 10.0], [4.0, 5.0, 6.0, 7.0, 20.0]]))
        );
    }

    #[tokio::test]
    async fn test_string_input_rejected() {
        let transformer: Container<BurnAdapter<TestBackend, Stack>, Transformer> =
            Container::new(Stack, ContainerConfig::new(), ExtraConfig::new()).unwrap();

        let result = transformer
            .transform(Inputs::single(arr1(&["a".to_string(), "b".to_string()])))
            .await;

        match result {
            Err(Error::UnsupportedInput { position, kind, backend }) => {
                assert_eq!(position, 0);
                assert_eq!(kind, "string");
                assert_eq!(backend, "burn");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
