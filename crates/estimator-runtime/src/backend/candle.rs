use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
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

const NAME: &str = "candle";

/// A converted model expressed directly as candle tensor operations.
///
/// # Example
///
/// ```ignore
/// struct Scale(Tensor);
///
/// #[async_trait]
/// impl TensorGraph for Scale {
///     async fn forward(&self, inputs: Vec<Tensor>) -> Result<GraphOutput<Tensor>> {
///         Ok(GraphOutput::Single(inputs[0].broadcast_mul(&self.0)?))
///     }
/// }
/// ```
#[async_trait]
pub trait TensorGraph: Send + Sync {
    async fn forward(&self, inputs: Vec<Tensor>) -> Result<GraphOutput<Tensor>>;

    /// Device the graph's parameters live on; inputs are placed there.
    fn device(&self) -> Device {
        Device::Cpu
    }
}

/// Copy a host array into a tensor on `device`, keeping its element type.
///
/// `i32` has no candle dtype and widens to `i64`.
pub fn to_tensor(array: &HostArray, position: usize, device: &Device) -> Result<Tensor> {
    let shape = array.shape().to_vec();
    Ok(match array {
        HostArray::F32(a) => Tensor::from_vec(a.iter().copied().collect::<Vec<_>>(), shape, device)?,
        HostArray::F64(a) => Tensor::from_vec(a.iter().copied().collect::<Vec<_>>(), shape, device)?,
        HostArray::I64(a) => Tensor::from_vec(a.iter().copied().collect::<Vec<_>>(), shape, device)?,
        HostArray::I32(a) => {
            Tensor::from_vec(a.iter().map(|v| i64::from(*v)).collect::<Vec<_>>(), shape, device)?
        }
        HostArray::U32(a) => Tensor::from_vec(a.iter().copied().collect::<Vec<_>>(), shape, device)?,
        HostArray::Str(_) => {
            return Err(Error::UnsupportedInput { position, kind: "string", backend: NAME });
        }
    })
}

/// Copy a tensor back to a host array.
///
/// `u8` masks come back as `u32`, half precision as `f32`.
pub fn from_tensor(tensor: &Tensor) -> Result<HostArray> {
    let tensor = tensor.to_device(&Device::Cpu)?;
    let shape = IxDyn(tensor.dims());
    let flat = tensor.flatten_all()?;
    Ok(match tensor.dtype() {
        DType::F64 => HostArray::from(ArrayD::from_shape_vec(shape, flat.to_vec1::<f64>()?)?),
        DType::I64 => HostArray::from(ArrayD::from_shape_vec(shape, flat.to_vec1::<i64>()?)?),
        DType::U32 => HostArray::from(ArrayD::from_shape_vec(shape, flat.to_vec1::<u32>()?)?),
        DType::U8 => HostArray::from(ArrayD::from_shape_vec(
            shape,
            flat.to_dtype(DType::U32)?.to_vec1::<u32>()?,
        )?),
        _ => HostArray::from(ArrayD::from_shape_vec(
            shape,
            flat.to_dtype(DType::F32)?.to_vec1::<f32>()?,
        )?),
    })
}

/// Runs a [`TensorGraph`] as-is.
pub struct CandleAdapter<G> {
    graph: G,
}

impl<G: TensorGraph> CandleAdapter<G> {
    pub fn graph(&self) -> &G {
        &self.graph
    }

    async fn execute(&self, inputs: Vec<HostArray>) -> Result<GraphOutput<Tensor>> {
        let device = self.graph.device();
        let tensors = inputs
            .iter()
            .enumerate()
            .map(|(position, input)| to_tensor(input, position, &device))
            .collect::<Result<Vec<_>>>()?;
        self.graph.forward(tensors).await
    }
}

impl<G: TensorGraph> Adapter for CandleAdapter<G> {
    type Model = G;
    const NAME: &'static str = NAME;

    fn build(graph: G, config: &ContainerConfig, _extra: &ExtraConfig) -> Result<Self> {
        debug!(device = ?graph.device(), n_threads = ?config.n_threads, "candle graph bound");
        Ok(Self { graph })
    }
}

#[async_trait]
impl<G: TensorGraph> TransformPrimitive for CandleAdapter<G> {
    async fn raw_transform(&self, inputs: Vec<HostArray>, _partition: Partition) -> Result<HostArray> {
        from_tensor(&self.execute(inputs).await?.single(NAME)?)
    }
}

#[async_trait]
impl<G: TensorGraph> PredictPrimitive for CandleAdapter<G> {
    async fn raw_predict(&self, inputs: Vec<HostArray>, _partition: Partition, task: Task) -> Result<HostArray> {
        let output = self.execute(inputs).await?.prediction(task, NAME)?;
        Ok(from_tensor(&output)?.ravel())
    }
}

#[async_trait]
impl<G: TensorGraph> PredictProbaPrimitive for CandleAdapter<G> {
    async fn raw_predict_proba(&self, inputs: Vec<HostArray>, _partition: Partition) -> Result<HostArray> {
        from_tensor(&self.execute(inputs).await?.nth(1, NAME)?)
    }
}

#[async_trait]
impl<G: TensorGraph> DecisionPrimitive for CandleAdapter<G> {
    async fn raw_decision_function(&self, inputs: Vec<HostArray>, _partition: Partition) -> Result<HostArray> {
        let scores = self.execute(inputs).await?.nth(1, NAME)?;
        Ok(from_tensor(&scores)?.ravel())
    }
}
