use chrono::NaiveDateTime;
use serde::Serialize;

/// One row of the aligned weather and traffic series.
///
/// Any field may be missing: a weather-only timestamp has no `traffic_volume`, a
/// traffic-only timestamp has no weather fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MergedRecord {
    pub timestamp: NaiveDateTime,
    pub traffic_volume: Option<f64>,
    pub temperature: Option<f64>,
    pub rainfall: Option<f64>,
    pub wind_speed: Option<f64>,
}

impl MergedRecord {
    pub fn empty(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            traffic_volume: None,
            temperature: None,
            rainfall: None,
            wind_speed: None,
        }
    }

    /// `[temperature, rainfall, wind_speed]` when all three are present.
    pub fn regressors(&self) -> Option<[f64; 3]> {
        Some([self.temperature?, self.rainfall?, self.wind_speed?])
    }

    /// True when the row can be used to train a model.
    pub fn is_complete(&self) -> bool {
        self.traffic_volume.is_some() && self.regressors().is_some()
    }
}
