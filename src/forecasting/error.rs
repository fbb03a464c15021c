use crate::error::FailureKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegressionError {
    #[error("Need at least {required} complete training rows, found {found}")]
    InsufficientTrainingData { required: usize, found: usize },

    #[error("Forecast horizon must be positive")]
    EmptyHorizon,

    #[error("Training timestamps do not advance, cannot infer a cadence")]
    UndefinedCadence,

    #[error("Normal equations are singular for {features} features")]
    Singular { features: usize },

    #[error("No future weather regressors available for any of the {horizon} requested steps")]
    MissingFutureRegressors { horizon: usize },
}

impl RegressionError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::InsufficientTrainingData
    }
}
