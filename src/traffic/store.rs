use crate::config::{TrafficColumns, TrafficSourceConfig};
use crate::traffic::error::TrafficDataError;
use crate::types::observation::TrafficObservation;
use crate::utils::parse_timestamp;
use log::{info, warn};
use polars::prelude::*;
use std::path::{Path, PathBuf};

/// Anything that can supply historical traffic counts.
pub trait TrafficSource: Send + Sync {
    /// Returns the history sorted by timestamp, ascending.
    fn load(&self) -> Result<Vec<TrafficObservation>, TrafficDataError>;
}

/// Reads traffic history from a CSV file with a timestamp column and a volume column.
///
/// Column names come from [`TrafficColumns`]; all other columns are ignored. Rows
/// whose volume is missing, non-numeric or negative are dropped. A timestamp that
/// matches none of the accepted formats fails the whole load.
#[derive(Debug, Clone)]
pub struct CsvTrafficStore {
    path: PathBuf,
    columns: TrafficColumns,
}

impl CsvTrafficStore {
    pub fn new(path: impl Into<PathBuf>, columns: TrafficColumns) -> Self {
        Self {
            path: path.into(),
            columns,
        }
    }

    pub fn from_config(config: &TrafficSourceConfig) -> Self {
        Self::new(config.path.clone(), config.columns.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_frame(&self) -> Result<DataFrame, TrafficDataError> {
        CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(self.path.clone()))
            .map_err(|e| TrafficDataError::CsvRead(self.path.clone(), e))?
            .finish()
            .map_err(|e| TrafficDataError::CsvRead(self.path.clone(), e))
    }

    fn column_as(
        &self,
        df: &DataFrame,
        name: &str,
        dtype: &DataType,
    ) -> Result<Column, TrafficDataError> {
        df.column(name)
            .map_err(|e| TrafficDataError::MissingColumn {
                path: self.path.clone(),
                column: name.to_string(),
                source: e,
            })?
            .cast(dtype)
            .map_err(|e| TrafficDataError::ColumnConversion {
                column: name.to_string(),
                source: e,
            })
    }
}

impl TrafficSource for CsvTrafficStore {
    fn load(&self) -> Result<Vec<TrafficObservation>, TrafficDataError> {
        if !self.path.is_file() {
            return Err(TrafficDataError::SourceMissing(self.path.clone()));
        }
        let df = self.read_frame()?;

        let timestamps = self.column_as(&df, &self.columns.timestamp, &DataType::String)?;
        let volumes = self.column_as(&df, &self.columns.volume, &DataType::Float64)?;
        let timestamps = timestamps
            .str()
            .map_err(|e| TrafficDataError::ColumnConversion {
                column: self.columns.timestamp.clone(),
                source: e,
            })?;
        let volumes = volumes
            .f64()
            .map_err(|e| TrafficDataError::ColumnConversion {
                column: self.columns.volume.clone(),
                source: e,
            })?;

        let mut history = Vec::with_capacity(df.height());
        let mut dropped = 0usize;
        for (row, (raw, volume)) in timestamps.into_iter().zip(volumes.into_iter()).enumerate() {
            let raw = raw.unwrap_or_default();
            let timestamp =
                parse_timestamp(raw).ok_or_else(|| TrafficDataError::InvalidTimestamp {
                    row,
                    value: raw.to_string(),
                })?;
            match volume {
                Some(traffic_volume) if traffic_volume.is_finite() && traffic_volume >= 0.0 => {
                    history.push(TrafficObservation {
                        timestamp,
                        traffic_volume,
                    });
                }
                _ => dropped += 1,
            }
        }

        if dropped > 0 {
            warn!(
                "Dropped {} traffic rows with missing or negative '{}' from {}",
                dropped,
                self.columns.volume,
                self.path.display()
            );
        }
        if history.is_empty() {
            return Err(TrafficDataError::NoRows(self.path.clone()));
        }

        history.sort_by_key(|o| o.timestamp);
        info!(
            "Loaded {} traffic rows from {} ({} to {})",
            history.len(),
            self.path.display(),
            history[0].timestamp,
            history[history.len() - 1].timestamp
        );
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::test_support::traffic_csv;
    use chrono::NaiveDate;

    fn columns() -> TrafficColumns {
        TrafficColumns::builder()
            .timestamp("날짜컬럼")
            .volume("교통량")
            .build()
    }

    #[test]
    fn test_load_sorts_and_drops_bad_volumes() -> Result<(), TrafficDataError> {
        let file = traffic_csv(
            "날짜컬럼,교통량,노선",
            &[
                "2024-07-01 08:00,1500,경부선".to_string(),
                "2024-07-01 06:00,1200,경부선".to_string(),
                "2024-07-01 07:00,,경부선".to_string(),
                "2024-07-01 09:00,-3,경부선".to_string(),
                "2024-07-01 10:00,1650.5,경부선".to_string(),
            ],
        );
        let store = CsvTrafficStore::new(file.path(), columns());
        let history = store.load()?;

        let volumes: Vec<f64> = history.iter().map(|o| o.traffic_volume).collect();
        assert_eq!(volumes, vec![1200.0, 1500.0, 1650.5]);
        assert_eq!(
            history[0].timestamp,
            NaiveDate::from_ymd_opt(2024, 7, 1)
                .unwrap()
                .and_hms_opt(6, 0, 0)
                .unwrap()
        );
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let store = CsvTrafficStore::new("does/not/exist.csv", columns());
        let err = store.load().unwrap_err();
        assert!(matches!(err, TrafficDataError::SourceMissing(_)));
        assert_eq!(err.kind(), FailureKind::DataUnavailable);
    }

    #[test]
    fn test_missing_column() {
        let file = traffic_csv("date,volume", &["2024-07-01 06:00,100".to_string()]);
        let err = CsvTrafficStore::new(file.path(), columns())
            .load()
            .unwrap_err();
        assert!(matches!(err, TrafficDataError::MissingColumn { .. }));
    }

    #[test]
    fn test_unparsable_timestamp() {
        let file = traffic_csv(
            "date,traffic_volume",
            &[
                "2024-07-01 06:00,100".to_string(),
                "sometime,120".to_string(),
            ],
        );
        let err = CsvTrafficStore::new(file.path(), TrafficColumns::default())
            .load()
            .unwrap_err();
        assert!(matches!(
            err,
            TrafficDataError::InvalidTimestamp { row: 1, .. }
        ));
    }

    #[test]
    fn test_no_usable_rows() {
        let file = traffic_csv("date,traffic_volume", &["2024-07-01 06:00,-1".to_string()]);
        let err = CsvTrafficStore::new(file.path(), TrafficColumns::default())
            .load()
            .unwrap_err();
        assert!(matches!(err, TrafficDataError::NoRows(_)));
    }
}
