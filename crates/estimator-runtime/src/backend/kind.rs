use std::fmt;
use std::str::FromStr;
use crate::error::{Error, Result};

/// The execution backend a converted model targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// The model graph runs as-is on a tensor library (`candle` feature).
    Direct,
    /// A traced/compiled graph over a typed tensor engine (`burn` feature).
    Compiled,
    /// A serialized interchange graph executed by ONNX Runtime (`onnx` feature).
    Interchange,
    /// Ahead-of-time compiled modules supplied through [`CompiledModule`](super::CompiledModule).
    Accelerated,
}

impl BackendKind {
    /// Fail with [`Error::RuntimeUnavailable`] if this backend was not compiled in.
    pub fn ensure_available(self) -> Result<()> {
        let missing = match self {
            BackendKind::Direct if !cfg!(feature = "candle") => Some("candle"),
            BackendKind::Compiled if !cfg!(feature = "burn") => Some("burn"),
            BackendKind::Interchange if !cfg!(feature = "onnx") => Some("onnx"),
            _ => None,
        };
        match missing {
            Some(feature) => Err(Error::RuntimeUnavailable {
                backend: self.name(),
                reason: format!("enable the `{feature}` feature to use it"),
            }),
            None => Ok(()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Direct => "direct",
            BackendKind::Compiled => "compiled",
            BackendKind::Interchange => "interchange",
            BackendKind::Accelerated => "accelerated",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "torch" | "pytorch" | "direct" => Ok(BackendKind::Direct),
            "torchscript" | "burn" | "compiled" => Ok(BackendKind::Compiled),
            "onnx" | "interchange" => Ok(BackendKind::Interchange),
            "tvm" | "accelerated" => Ok(BackendKind::Accelerated),
            _ => Err(Error::NotImplemented(format!(
                "backend '{s}'; expected one of torch, torchscript, onnx, tvm"
            ))),
        }
    }
}
