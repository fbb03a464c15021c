use crate::config::ConfigError;
use crate::forecasting::error::RegressionError;
use crate::traffic::error::TrafficDataError;
use crate::weather::error::{FetchError, TransportError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    TrafficData(#[from] TrafficDataError),

    #[error(transparent)]
    Regression(#[from] RegressionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Invalid forecast request: {0}")]
    InvalidRequest(String),
}

/// The failure taxonomy used in fallback explanations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NetworkError,
    HttpError(u16),
    ParseError,
    EmptyPayload,
    DataUnavailable,
    InsufficientTrainingData,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::NetworkError => write!(f, "network_error"),
            FailureKind::HttpError(code) => write!(f, "http_error({code})"),
            FailureKind::ParseError => write!(f, "parse_error"),
            FailureKind::EmptyPayload => write!(f, "empty_payload"),
            FailureKind::DataUnavailable => write!(f, "data_unavailable"),
            FailureKind::InsufficientTrainingData => write!(f, "insufficient_training_data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::HttpError(503).to_string(), "http_error(503)");
        assert_eq!(
            FetchError::EmptyPayload.kind().to_string(),
            "empty_payload"
        );
        assert_eq!(
            RegressionError::InsufficientTrainingData {
                required: 10,
                found: 3
            }
            .kind(),
            FailureKind::InsufficientTrainingData
        );
    }
}
