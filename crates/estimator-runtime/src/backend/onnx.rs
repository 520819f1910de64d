use std::sync::Mutex;
use async_trait::async_trait;
use ort::session::{Session, SessionInputValue};
use ort::value::{DynValue, Tensor};
use tracing::debug;
use super::{map_positional, Adapter};
use crate::config::{ContainerConfig, ExtraConfig};
use crate::container::{
    DecisionPrimitive, PredictPrimitive, PredictProbaPrimitive, Task, TransformPrimitive,
};
use crate::core::Partition;
use crate::error::{Error, Result};
use crate::tensor::HostArray;

const NAME: &str = "onnx";

/// Runs a serialized ONNX graph through an ONNX Runtime session.
///
/// Positional inputs are bound to the graph's declared input names in
/// order. When fewer inputs are given than the graph declares, the first
/// input is taken as a packed 2-D array with one column per input.
pub struct OnnxAdapter {
    session: Mutex<Session>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl OnnxAdapter {
    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    fn run_session(&self, inputs: Vec<HostArray>) -> Result<Vec<HostArray>> {
        let named = map_positional(&self.input_names, inputs, true)?;
        let values = named
            .into_iter()
            .enumerate()
            .map(|(position, (name, array))| Ok((name, to_value(array, position)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::Backend { backend: NAME, message: "session lock poisoned".to_string() })?;
        let outputs = session.run(values)?;
        let arrays = self
            .output_names
            .iter()
            .map(|name| extract(&outputs[name.as_str()]))
            .collect::<Result<Vec<_>>>()?;
        Ok(arrays)
    }

    /// Run and return output `index` of a graph declaring exactly `count` outputs.
    fn output(&self, inputs: Vec<HostArray>, count: usize, index: usize, call: &str) -> Result<HostArray> {
        check_output_count(&self.output_names, count, call)?;
        let mut outputs = self.run_session(inputs)?;
        if index >= outputs.len() {
            return Err(Error::shape(format!("{NAME} {call} outputs"), count, outputs.len()));
        }
        Ok(outputs.swap_remove(index))
    }
}

fn check_output_count(names: &[String], expected: usize, call: &str) -> Result<()> {
    if names.len() != expected {
        return Err(Error::shape(
            format!("{NAME} graph outputs for {call}"),
            expected,
            format!("{} ({names:?})", names.len()),
        ));
    }
    Ok(())
}

fn to_value(array: HostArray, position: usize) -> Result<SessionInputValue<'static>> {
    let value: DynValue = match array {
        HostArray::F32(a) => Tensor::from_array(a)?.into_dyn(),
        HostArray::F64(a) => Tensor::from_array(a)?.into_dyn(),
        HostArray::I64(a) => Tensor::from_array(a)?.into_dyn(),
        HostArray::I32(a) => Tensor::from_array(a)?.into_dyn(),
        HostArray::U32(a) => Tensor::from_array(a)?.into_dyn(),
        HostArray::Str(_) => {
            return Err(Error::UnsupportedInput { position, kind: "string", backend: NAME });
        }
    };
    Ok(value.into())
}

fn extract(value: &DynValue) -> Result<HostArray> {
    if let Ok(a) = value.try_extract_array::<f32>() {
        return Ok(HostArray::F32(a.to_owned()));
    }
    if let Ok(a) = value.try_extract_array::<i64>() {
        return Ok(HostArray::I64(a.to_owned()));
    }
    if let Ok(a) = value.try_extract_array::<f64>() {
        return Ok(HostArray::F64(a.to_owned()));
    }
    if let Ok(a) = value.try_extract_array::<i32>() {
        return Ok(HostArray::I32(a.to_owned()));
    }
    Err(Error::shape(
        format!("{NAME} output element type"),
        "an f32, i64, f64 or i32 tensor",
        format!("{:?}", value.dtype()),
    ))
}

impl Adapter for OnnxAdapter {
    /// The serialized graph.
    type Model = Vec<u8>;
    const NAME: &'static str = NAME;

    fn build(model: Vec<u8>, config: &ContainerConfig, _extra: &ExtraConfig) -> Result<Self> {
        let mut builder = Session::builder()
            .map_err(|e| Error::RuntimeUnavailable { backend: NAME, reason: e.to_string() })?;
        if let Some(n_threads) = config.n_threads {
            builder = builder
                .with_intra_threads(n_threads)?
                .with_inter_threads(1)?
                .with_parallel_execution(false)?;
        }
        let session = builder.commit_from_memory(&model)?;

        let input_names: Vec<String> = session.inputs.iter().map(|input| input.name.clone()).collect();
        let output_names: Vec<String> = session.outputs.iter().map(|output| output.name.clone()).collect();
        debug!(inputs = ?input_names, outputs = ?output_names, n_threads = ?config.n_threads, "onnx session created");

        Ok(Self { session: Mutex::new(session), input_names, output_names })
    }
}

#[async_trait]
impl TransformPrimitive for OnnxAdapter {
    async fn raw_transform(&self, inputs: Vec<HostArray>, _partition: Partition) -> Result<HostArray> {
        self.output(inputs, 1, 0, "transform")
    }
}

#[async_trait]
impl PredictPrimitive for OnnxAdapter {
    async fn raw_predict(&self, inputs: Vec<HostArray>, _partition: Partition, task: Task) -> Result<HostArray> {
        let count = if task.single_output() { 1 } else { 2 };
        Ok(self.output(inputs, count, 0, "predict")?.ravel())
    }
}

#[async_trait]
impl PredictProbaPrimitive for OnnxAdapter {
    async fn raw_predict_proba(&self, inputs: Vec<HostArray>, _partition: Partition) -> Result<HostArray> {
        self.output(inputs, 2, 1, "predict_proba")
    }
}

#[async_trait]
impl DecisionPrimitive for OnnxAdapter {
    async fn raw_decision_function(&self, inputs: Vec<HostArray>, _partition: Partition) -> Result<HostArray> {
        Ok(self.output(inputs, 2, 1, "decision_function")?.ravel())
    }
}
