use async_trait::async_trait;
use crate::config::{ContainerConfig, ExecutionContext, ExtraConfig};
use crate::container::Task;
use crate::error::{Error, Result};
use crate::tensor::HostArray;

/// What a converted graph returns from one forward pass.
///
/// Regression graphs yield `Single`. Classifiers yield
/// `Pair(labels, probabilities)` and anomaly detectors `Pair(labels, scores)`.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphOutput<T> {
    Single(T),
    Pair(T, T),
}

impl<T> GraphOutput<T> {
    pub fn arity(&self) -> usize {
        match self {
            GraphOutput::Single(_) => 1,
            GraphOutput::Pair(..) => 2,
        }
    }

    /// The only output of a single-output graph.
    pub fn single(self, backend: &'static str) -> Result<T> {
        match self {
            GraphOutput::Single(value) => Ok(value),
            GraphOutput::Pair(..) => Err(Error::shape(format!("{backend} graph outputs"), 1, 2)),
        }
    }

    /// Output `index` (0 or 1) of a two-output graph.
    pub fn nth(self, index: usize, backend: &'static str) -> Result<T> {
        match (self, index) {
            (GraphOutput::Pair(first, _), 0) => Ok(first),
            (GraphOutput::Pair(_, second), 1) => Ok(second),
            (output, _) => Err(Error::shape(
                format!("{backend} graph output {index}"),
                2,
                output.arity(),
            )),
        }
    }

    /// The output holding `predict` values for `task`.
    pub fn prediction(self, task: Task, backend: &'static str) -> Result<T> {
        if task.single_output() {
            self.single(backend)
        } else {
            self.nth(0, backend)
        }
    }

    pub fn map<U, F>(self, mut f: F) -> Result<GraphOutput<U>>
    where
        F: FnMut(T) -> Result<U>,
    {
        Ok(match self {
            GraphOutput::Single(value) => GraphOutput::Single(f(value)?),
            GraphOutput::Pair(first, second) => GraphOutput::Pair(f(first)?, f(second)?),
        })
    }
}

/// A binding between a converted model and one execution engine.
///
/// Built once when its container is constructed and owned by it for its
/// whole lifetime. Failing to build is fatal and never retried.
pub trait Adapter: Sized + Send + Sync {
    /// The converted model representation this adapter executes.
    type Model;

    /// Backend name used in errors and log fields.
    const NAME: &'static str;

    fn build(model: Self::Model, config: &ContainerConfig, extra: &ExtraConfig) -> Result<Self>;
}

/// An ahead-of-time compiled module with named inputs and positional outputs.
///
/// # Example
///
/// ```ignore
/// use estimator_runtime::backend::CompiledModule;
/// use async_trait::async_trait;
///
/// struct Doubler;
///
/// #[async_trait]
/// impl CompiledModule for Doubler {
///     async fn run(&self, _context: &ExecutionContext, inputs: Vec<(String, HostArray)>) -> Result<Vec<HostArray>> {
///         let (_, x) = inputs.into_iter().next().unwrap();
///         Ok(vec![HostArray::from(x.to_f32(0, "doubler")?.mapv(|v| v * 2.0))])
///     }
/// }
/// ```
#[async_trait]
pub trait CompiledModule: Send + Sync {
    /// Execute on `context`, returning outputs in positional order.
    async fn run(&self, context: &ExecutionContext, inputs: Vec<(String, HostArray)>) -> Result<Vec<HostArray>>;
}

/// Pair positional inputs with declared input names.
///
/// Equal counts zip in declaration order. With `unpack`, a single 2-D input
/// with one column per declared name is split into `(N, 1)` column vectors.
pub fn map_positional(
    names: &[String],
    inputs: Vec<HostArray>,
    unpack: bool,
) -> Result<Vec<(String, HostArray)>> {
    let inputs = if inputs.len() == names.len() {
        inputs
    } else if unpack && inputs.len() == 1 {
        let columns = inputs[0].split_columns()?;
        if columns.len() != names.len() {
            return Err(Error::shape("unpacked input columns", names.len(), columns.len()));
        }
        columns
    } else {
        return Err(Error::shape("positional inputs", names.len(), inputs.len()));
    };
    Ok(names.iter().cloned().zip(inputs).collect())
}
