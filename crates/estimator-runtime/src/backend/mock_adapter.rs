use std::sync::Mutex;
use async_trait::async_trait;
use ndarray::{Array1, Array2, Axis};
use crate::backend::Adapter;
use crate::config::{ContainerConfig, ExtraConfig};
use crate::container::{
    DecisionPrimitive, PredictPrimitive, PredictProbaPrimitive, Task, TransformPrimitive,
};
use crate::core::Partition;
use crate::error::{Error, Result};
use crate::tensor::HostArray;

/// Operates on the column-stacked `f32` view of its inputs:
///
/// - transform doubles every value
/// - regression sums each row
/// - classification labels each row by its arg-max column
/// - anomaly labels follow the sign of the first column, which is also the score
/// - probabilities are the row-normalised values
#[derive(Debug, Default)]
pub struct MockGraph;

/// Records every partition it is asked to score.
#[derive(Debug)]
pub struct MockAdapter {
    seen: Mutex<Vec<Partition>>,
}

impl MockAdapter {
    pub fn partitions(&self) -> Vec<Partition> {
        self.seen.lock().unwrap().clone()
    }

    fn features(&self, inputs: Vec<HostArray>, partition: Partition) -> Result<Array2<f32>> {
        self.seen.lock().unwrap().push(partition);
        let columns = inputs
            .iter()
            .enumerate()
            .map(|(position, input)| {
                let values = input.to_f32(position, Self::NAME)?;
                let rows = values.shape()[0];
                let width = if rows == 0 { 0 } else { values.len() / rows };
                Ok(values.into_shape_with_order((rows, width))?)
            })
            .collect::<Result<Vec<Array2<f32>>>>()?;
        let views: Vec<_> = columns.iter().map(Array2::view).collect();
        Ok(ndarray::concatenate(Axis(1), &views)?)
    }
}

impl Adapter for MockAdapter {
    type Model = MockGraph;
    const NAME: &'static str = "mock";

    fn build(_model: MockGraph, _config: &ContainerConfig, _extra: &ExtraConfig) -> Result<Self> {
        Ok(Self { seen: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl TransformPrimitive for MockAdapter {
    async fn raw_transform(&self, inputs: Vec<HostArray>, partition: Partition) -> Result<HostArray> {
        Ok(HostArray::from(self.features(inputs, partition)?.mapv(|v| v * 2.0)))
    }
}

#[async_trait]
impl PredictPrimitive for MockAdapter {
    async fn raw_predict(&self, inputs: Vec<HostArray>, partition: Partition, task: Task) -> Result<HostArray> {
        let x = self.features(inputs, partition)?;
        Ok(match task {
            Task::Regression => HostArray::from(x.sum_axis(Axis(1))),
            Task::Classification => {
                let labels: Array1<i64> = x
                    .rows()
                    .into_iter()
                    .map(|row| {
                        let mut best = 0;
                        for (idx, value) in row.iter().enumerate() {
                            if *value > row[best] {
                                best = idx;
                            }
                        }
                        best as i64
                    })
                    .collect();
                HostArray::from(labels)
            }
            Task::AnomalyDetection => {
                HostArray::from(x.column(0).mapv(|v| if v >= 0.0 { 1i64 } else { -1 }))
            }
            Task::Transform => return Err(Error::Config("transform graphs cannot predict".to_string())),
        })
    }
}

#[async_trait]
impl PredictProbaPrimitive for MockAdapter {
    async fn raw_predict_proba(&self, inputs: Vec<HostArray>, partition: Partition) -> Result<HostArray> {
        let x = self.features(inputs, partition)?;
        let totals = x.sum_axis(Axis(1)).insert_axis(Axis(1));
        Ok(HostArray::from(&x / &totals))
    }
}

#[async_trait]
impl DecisionPrimitive for MockAdapter {
    async fn raw_decision_function(&self, inputs: Vec<HostArray>, partition: Partition) -> Result<HostArray> {
        let x = self.features(inputs, partition)?;
        Ok(HostArray::from(x.column(0).to_owned()))
    }
}
