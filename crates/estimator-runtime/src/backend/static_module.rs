use async_trait::async_trait;
use candle_core::Device;
use super::candle::{from_tensor, to_tensor, TensorGraph};
use super::{CompiledModule, GraphOutput};
use crate::config::{DeviceKind, ExecutionContext};
use crate::error::{Error, Result};
use crate::tensor::HostArray;

/// A [`TensorGraph`] frozen against a fixed row count and named inputs.
///
/// Behaves like a module compiled ahead of time for one batch shape: any
/// other row count is rejected, so the final partition of an unevenly
/// batched call needs a second module compiled for the remainder.
pub struct StaticShapeModule<G> {
    graph: G,
    rows: usize,
    input_names: Vec<String>,
}

impl<G: TensorGraph> StaticShapeModule<G> {
    pub fn new(graph: G, rows: usize, input_names: Vec<String>) -> Self {
        Self { graph, rows, input_names }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    fn check_inputs(&self, inputs: &[(String, HostArray)]) -> Result<()> {
        let names: Vec<&str> = inputs.iter().map(|(name, _)| name.as_str()).collect();
        if names != self.input_names {
            return Err(Error::shape(
                "compiled module inputs",
                format!("{:?}", self.input_names),
                format!("{names:?}"),
            ));
        }
        for (name, array) in inputs {
            let rows = array.rows().unwrap_or(0);
            if rows != self.rows {
                return Err(Error::shape(format!("compiled module input `{name}` rows"), self.rows, rows));
            }
        }
        Ok(())
    }
}

fn device(context: &ExecutionContext) -> Result<Device> {
    Ok(match context.device {
        DeviceKind::Cpu => Device::Cpu,
        DeviceKind::Cuda => Device::new_cuda(context.ordinal)?,
        DeviceKind::Metal => Device::new_metal(context.ordinal)?,
    })
}

#[async_trait]
impl<G: TensorGraph> CompiledModule for StaticShapeModule<G> {
    async fn run(&self, context: &ExecutionContext, inputs: Vec<(String, HostArray)>) -> Result<Vec<HostArray>> {
        self.check_inputs(&inputs)?;
        let device = device(context)?;
        let tensors = inputs
            .iter()
            .enumerate()
            .map(|(position, (_, array))| to_tensor(array, position, &device))
            .collect::<Result<Vec<_>>>()?;
        match self.graph.forward(tensors).await? {
            GraphOutput::Single(value) => Ok(vec![from_tensor(&value)?]),
            GraphOutput::Pair(first, second) => Ok(vec![from_tensor(&first)?, from_tensor(&second)?]),
        }
    }
}
