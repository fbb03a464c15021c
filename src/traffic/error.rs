use crate::error::FailureKind;
use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrafficDataError {
    #[error("Traffic history file '{0}' does not exist")]
    SourceMissing(PathBuf),

    #[error("Failed to read traffic history CSV '{0}'")]
    CsvRead(PathBuf, #[source] PolarsError),

    #[error("Column '{column}' not found in traffic history '{path}'")]
    MissingColumn {
        path: PathBuf,
        column: String,
        #[source]
        source: PolarsError,
    },

    #[error("Failed to convert column '{column}' of traffic history")]
    ColumnConversion {
        column: String,
        #[source]
        source: PolarsError,
    },

    #[error("Unparsable timestamp '{value}' in row {row} of traffic history")]
    InvalidTimestamp { row: usize, value: String },

    #[error("Traffic history '{0}' contains no usable rows")]
    NoRows(PathBuf),
}

impl TrafficDataError {
    /// Every traffic failure is `data_unavailable`.
    pub fn kind(&self) -> FailureKind {
        FailureKind::DataUnavailable
    }
}
