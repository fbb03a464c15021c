//! The value returned by a forecasting run.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// Which strategy produced a [`ForecastResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastOrigin {
    Regression,
    Fallback,
}

impl fmt::Display for ForecastOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForecastOrigin::Regression => write!(f, "regression"),
            ForecastOrigin::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub timestamp: NaiveDateTime,
    pub predicted_traffic_volume: f64,
}

/// A traffic forecast.
///
/// `horizon_points` is never empty and every predicted volume is `>= 0`.
/// A fallback result always carries an `explanation` naming the failure that
/// triggered it and the rule that produced the value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    pub origin: ForecastOrigin,
    pub horizon_points: Vec<ForecastPoint>,
    pub explanation: Option<String>,
    /// Non-fatal notices, e.g. a horizon shortened for lack of future weather.
    pub warnings: Vec<String>,
}

impl ForecastResult {
    /// `true` when the rule ladder produced this result.
    pub fn is_fallback(&self) -> bool {
        self.origin == ForecastOrigin::Fallback
    }

    /// The predicted volumes in horizon order, without their timestamps.
    pub fn values(&self) -> Vec<f64> {
        self.horizon_points
            .iter()
            .map(|p| p.predicted_traffic_volume)
            .collect()
    }
}
