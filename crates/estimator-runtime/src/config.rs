//! # Run configuration
//!
//! A container is configured by two things handed over by the conversion
//! pipeline:
//!
//! - [`ContainerConfig`]: thread count and batch size, both optional.
//! - [`ExtraConfig`]: a string-keyed mapping of named options. The keys this
//!   crate understands are the constants of this module; values are typed
//!   through [`ConfigValue`].
//!
//! Both can be read from JSON. Backend handles ([`ConfigValue::Module`]) cannot,
//! and have to be inserted programmatically.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::backend::CompiledModule;
use crate::error::{Error, Result};

/// Added to every anomaly score by `decision_function` (older anomaly model semantics).
pub const IFOREST_THRESHOLD: &str = "iforest_threshold";

/// Added to `decision_function` by `score_samples`.
pub const OFFSET: &str = "offset";

/// [`ExecutionContext`] on which an accelerated compiled module runs.
pub const CONTEXT: &str = "context";

/// Declared input name ordering of a compiled module.
pub const INPUT_NAMES: &str = "input_names";

/// Optional compiled module used for the final partition of a batched call.
pub const REMAINDER_MODEL: &str = "remainder_model";

/// Batch size hint required by some converters at conversion time.
pub const BATCH_SIZE: &str = "batch_size";

/// Number of input features, a hint for converters that pre-shape their graph.
pub const N_FEATURES: &str = "n_features";

/// Environment variable read by ahead-of-time compiled runtimes for their thread pool size.
pub const COMPILED_NUM_THREADS_ENV: &str = "TVM_NUM_THREADS";

/// Thread count and batching for one container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Threads the backend may use; `None` means all available.
    #[serde(default)]
    pub n_threads: Option<usize>,

    /// Rows per partition; `None` disables batching.
    #[serde(default)]
    pub batch_size: Option<usize>,
}

impl ContainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = Some(n_threads);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Parse from a JSON object such as `{"n_threads": 4, "batch_size": 1000}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero thread counts and zero batch sizes.
    pub fn validate(&self) -> Result<()> {
        if self.n_threads == Some(0) {
            return Err(Error::Config("n_threads must be a positive integer".to_string()));
        }
        if self.batch_size == Some(0) {
            return Err(Error::Config("batch_size must be a positive integer".to_string()));
        }
        Ok(())
    }
}

/// Kind of device an execution context refers to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Cpu,
    Cuda,
    Metal,
}

/// A precomputed device handle for accelerated compiled modules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub device: DeviceKind,
    #[serde(default)]
    pub ordinal: usize,
}

impl ExecutionContext {
    pub fn cpu() -> Self {
        Self::default()
    }

    pub fn cuda(ordinal: usize) -> Self {
        Self { device: DeviceKind::Cuda, ordinal }
    }
}

/// One value of the extra-configuration mapping.
#[derive(Clone)]
pub enum ConfigValue {
    Float(f64),
    Int(i64),
    Names(Vec<String>),
    Context(ExecutionContext),
    Module(Arc<dyn CompiledModule>),
}

impl ConfigValue {
    fn kind(&self) -> &'static str {
        match self {
            ConfigValue::Float(_) => "float",
            ConfigValue::Int(_) => "integer",
            ConfigValue::Names(_) => "name list",
            ConfigValue::Context(_) => "execution context",
            ConfigValue::Module(_) => "compiled module",
        }
    }
}

impl fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Float(v) => write!(f, "Float({v})"),
            ConfigValue::Int(v) => write!(f, "Int({v})"),
            ConfigValue::Names(v) => write!(f, "Names({v:?})"),
            ConfigValue::Context(v) => write!(f, "Context({v:?})"),
            ConfigValue::Module(_) => write!(f, "Module(..)"),
        }
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<usize> for ConfigValue {
    fn from(value: usize) -> Self {
        ConfigValue::Int(value as i64)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(value: Vec<String>) -> Self {
        ConfigValue::Names(value)
    }
}

impl From<ExecutionContext> for ConfigValue {
    fn from(value: ExecutionContext) -> Self {
        ConfigValue::Context(value)
    }
}

impl From<Arc<dyn CompiledModule>> for ConfigValue {
    fn from(value: Arc<dyn CompiledModule>) -> Self {
        ConfigValue::Module(value)
    }
}

/// The serialisable subset of [`ConfigValue`].
#[derive(Deserialize)]
#[serde(untagged)]
enum ScalarValue {
    Int(i64),
    Float(f64),
    Names(Vec<String>),
    Context(ExecutionContext),
}

impl From<ScalarValue> for ConfigValue {
    fn from(value: ScalarValue) -> Self {
        match value {
            ScalarValue::Int(v) => ConfigValue::Int(v),
            ScalarValue::Float(v) => ConfigValue::Float(v),
            ScalarValue::Names(v) => ConfigValue::Names(v),
            ScalarValue::Context(v) => ConfigValue::Context(v),
        }
    }
}

/// The extra-configuration mapping of named options.
#[derive(Debug, Clone, Default)]
pub struct ExtraConfig {
    values: BTreeMap<String, ConfigValue>,
}

impl ExtraConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse scalar options from a JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, ScalarValue> = serde_json::from_str(json)?;
        Ok(Self {
            values: raw.into_iter().map(|(k, v)| (k, v.into())).collect(),
        })
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// A float option; integers are accepted and widened.
    pub fn f64(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(ConfigValue::Float(v)) => Ok(Some(*v)),
            Some(ConfigValue::Int(v)) => Ok(Some(*v as f64)),
            Some(other) => Err(Self::wrong_type(key, "float", other)),
        }
    }

    pub fn require_f64(&self, key: &'static str, reason: &str) -> Result<f64> {
        self.f64(key)?.ok_or_else(|| Self::missing(key, reason))
    }

    /// A positive integer option.
    pub fn usize(&self, key: &str) -> Result<Option<usize>> {
        match self.get(key) {
            None => Ok(None),
            Some(ConfigValue::Int(v)) if *v > 0 => Ok(Some(*v as usize)),
            Some(ConfigValue::Int(v)) => Err(Error::Config(format!(
                "`{key}` must be a positive integer, got {v}"
            ))),
            Some(other) => Err(Self::wrong_type(key, "integer", other)),
        }
    }

    pub fn require_usize(&self, key: &'static str, reason: &str) -> Result<usize> {
        self.usize(key)?.ok_or_else(|| Self::missing(key, reason))
    }

    pub fn names(&self, key: &str) -> Result<Option<&[String]>> {
        match self.get(key) {
            None => Ok(None),
            Some(ConfigValue::Names(v)) => Ok(Some(v.as_slice())),
            Some(other) => Err(Self::wrong_type(key, "name list", other)),
        }
    }

    pub fn require_names(&self, key: &'static str, reason: &str) -> Result<&[String]> {
        self.names(key)?.ok_or_else(|| Self::missing(key, reason))
    }

    pub fn require_context(&self, key: &'static str, reason: &str) -> Result<ExecutionContext> {
        match self.get(key) {
            None => Err(Self::missing(key, reason)),
            Some(ConfigValue::Context(v)) => Ok(*v),
            Some(other) => Err(Self::wrong_type(key, "execution context", other)),
        }
    }

    pub fn module(&self, key: &str) -> Result<Option<Arc<dyn CompiledModule>>> {
        match self.get(key) {
            None => Ok(None),
            Some(ConfigValue::Module(v)) => Ok(Some(v.clone())),
            Some(other) => Err(Self::wrong_type(key, "compiled module", other)),
        }
    }

    fn missing(key: &'static str, reason: &str) -> Error {
        Error::MissingConfig { key, reason: reason.to_string() }
    }

    fn wrong_type(key: &str, expected: &str, actual: &ConfigValue) -> Error {
        Error::Config(format!("`{key}` must be a {expected}, got a {}", actual.kind()))
    }
}
