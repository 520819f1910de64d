use async_trait::async_trait;
use candle_core::{DType, Tensor};
use crate::backend::candle::TensorGraph;
use crate::backend::GraphOutput;
use crate::error::{Error, Result};
use crate::tensor::constant::FEATURE_DIM;

/// Concatenates every input, as `f32` columns, along the feature axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorAssembler;

#[async_trait]
impl TensorGraph for VectorAssembler {
    async fn forward(&self, inputs: Vec<Tensor>) -> Result<GraphOutput<Tensor>> {
        if inputs.is_empty() {
            return Err(Error::shape("vector assembler inputs", "at least one input", 0));
        }
        let columns = inputs
            .iter()
            .map(|input| {
                let rows = input.dim(0)?;
                Ok(input.to_dtype(DType::F32)?.reshape((rows, ()))?)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(GraphOutput::Single(Tensor::cat(&columns, FEATURE_DIM)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};
    use crate::backend::candle::CandleAdapter;
    use crate::config::{ContainerConfig, ExtraConfig};
    use crate::container::{Container, Transformer, Transforms};
    use crate::tensor::{Frame, HostArray, Inputs};

    fn frame() -> Frame {
        Frame::new()
            .with_column("a", arr1(&[1.0f32, 2.0, 3.0]))
            .with_column("b", arr1(&[4i64, 5, 6]))
    }

    fn assembler(config: ContainerConfig) -> Container<CandleAdapter<VectorAssembler>, Transformer> {
        Container::new(VectorAssembler, config, ExtraConfig::new()).unwrap()
    }

    #[tokio::test]
    async fn test_frame_columns_stacked() {
        let expected = HostArray::from(arr2(&[[1.0f32, 4.0], [2.0, 5.0], [3.0, 6.0]]));

        let unbatched = assembler(ContainerConfig::new()).transform(frame().into()).await.unwrap();
        let batched = assembler(ContainerConfig::new().with_batch_size(2))
            .transform(frame().into())
            .await
            .unwrap();

        assert_eq!(unbatched, expected);
        assert_eq!(batched, expected);
    }

    #[tokio::test]
    async fn test_wide_inputs_keep_their_columns() {
        let inputs = Inputs::Arrays(vec![
            HostArray::from(arr2(&[[1.0f64, 2.0], [3.0, 4.0]])),
            HostArray::from(arr1(&[9i32, 8])),
        ]);

        let output = assembler(ContainerConfig::new()).transform(inputs).await.unwrap();

        assert_eq!(output, HostArray::from(arr2(&[[1.0f32, 2.0, 9.0], [3.0, 4.0, 8.0]])));
    }
}
