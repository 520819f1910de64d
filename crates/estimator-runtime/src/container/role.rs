use crate::error::{Error, Result};

/// What a converted graph computes, which fixes how its outputs are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Transform,
    Regression,
    Classification,
    AnomalyDetection,
}

impl Task {
    /// Resolve a predicting task from the conversion pipeline's flags.
    ///
    /// Regression and anomaly detection are mutually exclusive.
    pub fn from_flags(is_regression: bool, is_anomaly_detection: bool) -> Result<Self> {
        match (is_regression, is_anomaly_detection) {
            (true, true) => Err(Error::Config(
                "a model cannot be both a regressor and an anomaly detector".to_string(),
            )),
            (true, false) => Ok(Task::Regression),
            (false, true) => Ok(Task::AnomalyDetection),
            (false, false) => Ok(Task::Classification),
        }
    }

    /// Whether the graph yields a single output.
    pub fn single_output(self) -> bool {
        matches!(self, Task::Transform | Task::Regression)
    }
}

/// A container role: the set of prediction methods a container exposes.
pub trait Role: Send + Sync + 'static {
    const NAME: &'static str;

    fn task() -> Result<Task>;
}

/// Roles that expose `predict`.
pub trait PredictingRole: Role {}

#[derive(Debug, Clone, Copy, Default)]
pub struct Transformer;

#[derive(Debug, Clone, Copy, Default)]
pub struct Regressor;

#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier;

#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyDetector;

impl Role for Transformer {
    const NAME: &'static str = "transformer";

    fn task() -> Result<Task> {
        Ok(Task::Transform)
    }
}

impl Role for Regressor {
    const NAME: &'static str = "regressor";

    fn task() -> Result<Task> {
        Task::from_flags(true, false)
    }
}

impl Role for Classifier {
    const NAME: &'static str = "classifier";

    fn task() -> Result<Task> {
        Task::from_flags(false, false)
    }
}

impl Role for AnomalyDetector {
    const NAME: &'static str = "anomaly_detector";

    fn task() -> Result<Task> {
        Task::from_flags(false, true)
    }
}

impl PredictingRole for Regressor {}
impl PredictingRole for Classifier {}
impl PredictingRole for AnomalyDetector {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicting_flags_rejected() {
        assert!(matches!(Task::from_flags(true, true), Err(Error::Config(_))));
    }

    #[test]
    fn test_role_tasks() {
        assert_eq!(Transformer::task().unwrap(), Task::Transform);
        assert_eq!(Regressor::task().unwrap(), Task::Regression);
        assert_eq!(Classifier::task().unwrap(), Task::Classification);
        assert_eq!(AnomalyDetector::task().unwrap(), Task::AnomalyDetection);
        assert!(!Task::AnomalyDetection.single_output());
    }
}
