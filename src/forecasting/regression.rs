//! Weather-conditioned linear regression over the aligned series.
//!
//! The model is an additive decomposition fitted by ridge-regularised least squares:
//!
//! ```text
//! volume = intercept + trend(t) + daily(t) + weekly(t)
//!        + b1 * temperature + b2 * rainfall + b3 * wind_speed
//! ```
//!
//! `daily` and `weekly` are Fourier series with periods of 24 hours and 7 days.
//! Each is only included when the training data covers at least two full periods and
//! is sampled more often than once per period. All features are standardised before
//! fitting and columns that are constant over the training window are left out.

use crate::config::RegressionConfig;
use crate::forecasting::error::RegressionError;
use crate::forecasting::linalg::solve;
use crate::types::forecast_result::ForecastPoint;
use crate::types::merged_record::MergedRecord;
use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::f64::consts::TAU;

const MINUTES_PER_DAY: f64 = 1440.0;
const CONSTANT_EPSILON: f64 = 1e-9;

/// Points produced by a [`TrafficForecaster`].
#[derive(Debug, Clone, PartialEq)]
pub struct ModelForecast {
    pub points: Vec<ForecastPoint>,
    pub requested_horizon: usize,
    /// In-sample coefficient of determination of the fitted model.
    pub r_squared: f64,
}

impl ModelForecast {
    /// True when fewer points than requested could be produced.
    pub fn is_truncated(&self) -> bool {
        self.points.len() < self.requested_horizon
    }
}

/// A strategy that turns aligned history plus future weather into a forecast.
pub trait TrafficForecaster: Send + Sync {
    fn fit_predict(
        &self,
        records: &[MergedRecord],
        horizon: usize,
    ) -> Result<ModelForecast, RegressionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SeasonalOrders {
    daily: usize,
    weekly: usize,
}

/// A fitted regression model.
#[derive(Debug, Clone)]
pub struct FittedModel {
    origin: NaiveDateTime,
    last_timestamp: NaiveDateTime,
    cadence: Duration,
    trend_scale_hours: f64,
    seasonal: SeasonalOrders,
    means: Vec<f64>,
    /// Standard deviation per feature, `0.0` for dropped constant features.
    scales: Vec<f64>,
    intercept: f64,
    weights: Vec<f64>,
    r_squared: f64,
    training_rows: usize,
}

impl FittedModel {
    /// Median spacing of the training timestamps. Forecast steps are multiples of it.
    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    /// Coefficient of determination on the training rows.
    pub fn r_squared(&self) -> f64 {
        self.r_squared
    }

    /// Mean of the training target, the intercept in standardised space.
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Weights of the standardised features, in the order of [`feature_names`](Self::feature_names).
    /// Dropped features have weight `0.0`.
    pub fn coefficients(&self) -> &[f64] {
        &self.weights
    }

    pub fn feature_names(&self) -> Vec<String> {
        let mut names = vec!["trend".to_string()];
        for (prefix, order) in [("daily", self.seasonal.daily), ("weekly", self.seasonal.weekly)] {
            for k in 1..=order {
                names.push(format!("{prefix}_sin_{k}"));
                names.push(format!("{prefix}_cos_{k}"));
            }
        }
        names.extend(["temperature", "rainfall", "wind_speed"].map(String::from));
        names
    }

    pub fn training_rows(&self) -> usize {
        self.training_rows
    }

    pub fn last_training_timestamp(&self) -> NaiveDateTime {
        self.last_timestamp
    }

    fn raw_features(&self, timestamp: NaiveDateTime, regressors: [f64; 3]) -> Vec<f64> {
        let hours = (timestamp - self.origin).num_minutes() as f64 / 60.0;
        let minute_of_day = f64::from(timestamp.hour() * 60 + timestamp.minute());
        let day_phase = minute_of_day / MINUTES_PER_DAY;
        let week_phase = (f64::from(timestamp.weekday().num_days_from_monday()) * MINUTES_PER_DAY
            + minute_of_day)
            / (7.0 * MINUTES_PER_DAY);

        let mut features = vec![hours / self.trend_scale_hours];
        push_fourier(&mut features, day_phase, self.seasonal.daily);
        push_fourier(&mut features, week_phase, self.seasonal.weekly);
        features.extend(regressors);
        features
    }

    /// Predicted volume at `timestamp` given its weather. Not clamped.
    pub fn predict(&self, timestamp: NaiveDateTime, regressors: [f64; 3]) -> f64 {
        self.raw_features(timestamp, regressors)
            .iter()
            .enumerate()
            .filter(|&(j, _)| self.scales[j] > 0.0)
            .map(|(j, x)| self.weights[j] * (x - self.means[j]) / self.scales[j])
            .sum::<f64>()
            + self.intercept
    }
}

fn push_fourier(features: &mut Vec<f64>, phase: f64, order: usize) {
    for k in 1..=order {
        let angle = TAU * k as f64 * phase;
        features.push(angle.sin());
        features.push(angle.cos());
    }
}

/// Median of the positive gaps between consecutive sorted timestamps.
fn median_gap(timestamps: &[NaiveDateTime]) -> Option<Duration> {
    let mut gaps: Vec<Duration> = timestamps
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|gap| *gap > Duration::zero())
        .collect();
    if gaps.is_empty() {
        return None;
    }
    gaps.sort();
    Some(gaps[(gaps.len() - 1) / 2])
}

/// Ridge regression forecaster conditioned on temperature, rainfall and wind speed.
#[derive(Debug, Clone, Default)]
pub struct RegressionForecaster {
    config: RegressionConfig,
}

impl RegressionForecaster {
    /// Creates a forecaster.
    ///
    /// # Arguments
    ///
    /// * `config` - Minimum training rows, Fourier orders and ridge penalty. See
    ///   [`RegressionConfig`] for the defaults used by [`Default`].
    pub fn new(config: RegressionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegressionConfig {
        &self.config
    }

    /// Fits a model to the complete rows of `records`.
    pub fn fit(&self, records: &[MergedRecord]) -> Result<FittedModel, RegressionError> {
        let mut rows: Vec<(NaiveDateTime, f64, [f64; 3])> = records
            .iter()
            .filter_map(|r| Some((r.timestamp, r.traffic_volume?, r.regressors()?)))
            .collect();
        if rows.len() < self.config.min_training_rows {
            return Err(RegressionError::InsufficientTrainingData {
                required: self.config.min_training_rows,
                found: rows.len(),
            });
        }
        rows.sort_by_key(|(timestamp, _, _)| *timestamp);

        let timestamps: Vec<NaiveDateTime> = rows.iter().map(|(t, _, _)| *t).collect();
        let cadence = median_gap(&timestamps).ok_or(RegressionError::UndefinedCadence)?;
        let origin = timestamps[0];
        let last_timestamp = timestamps[timestamps.len() - 1];
        let span = last_timestamp - origin;

        let seasonal_order = |period: Duration, order: usize| {
            if span >= period * 2 && cadence < period {
                order
            } else {
                0
            }
        };
        let seasonal = SeasonalOrders {
            daily: seasonal_order(Duration::days(1), self.config.daily_fourier_order),
            weekly: seasonal_order(Duration::weeks(1), self.config.weekly_fourier_order),
        };

        let mut model = FittedModel {
            origin,
            last_timestamp,
            cadence,
            trend_scale_hours: (span.num_minutes() as f64 / 60.0).max(1.0),
            seasonal,
            means: Vec::new(),
            scales: Vec::new(),
            intercept: 0.0,
            weights: Vec::new(),
            r_squared: 0.0,
            training_rows: rows.len(),
        };

        let design: Vec<Vec<f64>> = rows
            .iter()
            .map(|(timestamp, _, regressors)| model.raw_features(*timestamp, *regressors))
            .collect();
        let targets: Vec<f64> = rows.iter().map(|(_, volume, _)| *volume).collect();
        let n = rows.len() as f64;
        let width = design[0].len();

        let means: Vec<f64> = (0..width)
            .map(|j| design.iter().map(|x| x[j]).sum::<f64>() / n)
            .collect();
        let scales: Vec<f64> = (0..width)
            .map(|j| {
                let variance = design.iter().map(|x| (x[j] - means[j]).powi(2)).sum::<f64>() / n;
                let std = variance.sqrt();
                if std > CONSTANT_EPSILON {
                    std
                } else {
                    0.0
                }
            })
            .collect();
        let active: Vec<usize> = (0..width).filter(|&j| scales[j] > 0.0).collect();

        let target_mean = targets.iter().sum::<f64>() / n;
        let standardised: Vec<Vec<f64>> = design
            .iter()
            .map(|x| {
                active
                    .iter()
                    .map(|&j| (x[j] - means[j]) / scales[j])
                    .collect()
            })
            .collect();

        // Normal equations (ZᵀZ + λnI) w = Zᵀ(y - ȳ)
        let p = active.len();
        let penalty = self.config.ridge_penalty * n;
        let mut gram = vec![vec![0.0; p]; p];
        let mut moment = vec![0.0; p];
        for (z, y) in standardised.iter().zip(&targets) {
            for a in 0..p {
                moment[a] += z[a] * (y - target_mean);
                for b in a..p {
                    gram[a][b] += z[a] * z[b];
                }
            }
        }
        for a in 0..p {
            gram[a][a] += penalty;
            for b in 0..a {
                gram[a][b] = gram[b][a];
            }
        }
        let solved = solve(gram, moment).ok_or(RegressionError::Singular { features: p })?;

        let mut weights = vec![0.0; width];
        for (&j, w) in active.iter().zip(solved) {
            weights[j] = w;
        }

        model.means = means;
        model.scales = scales;
        model.intercept = target_mean;
        model.weights = weights;

        let total: f64 = targets.iter().map(|y| (y - target_mean).powi(2)).sum();
        let residual: f64 = rows
            .iter()
            .map(|(timestamp, volume, regressors)| {
                (volume - model.predict(*timestamp, *regressors)).powi(2)
            })
            .sum();
        model.r_squared = if total > 0.0 {
            1.0 - residual / total
        } else {
            1.0
        };

        debug!(
            "Fitted regression on {} rows, cadence {} min, {} of {} features active, daily order {}, weekly order {}",
            model.training_rows,
            cadence.num_minutes(),
            p,
            width,
            seasonal.daily,
            seasonal.weekly
        );
        Ok(model)
    }
}

impl TrafficForecaster for RegressionForecaster {
    /// Fits on the complete rows, then predicts `last_training + k * cadence` for
    /// `k = 1..=horizon` wherever the records hold all three weather values at exactly
    /// that timestamp. Steps without weather are skipped. Predictions are clamped to
    /// be non-negative.
    fn fit_predict(
        &self,
        records: &[MergedRecord],
        horizon: usize,
    ) -> Result<ModelForecast, RegressionError> {
        if horizon == 0 {
            return Err(RegressionError::EmptyHorizon);
        }
        let model = self.fit(records)?;
        let last = model.last_training_timestamp();

        let future: HashMap<NaiveDateTime, [f64; 3]> = records
            .iter()
            .filter(|r| r.timestamp > last)
            .filter_map(|r| Some((r.timestamp, r.regressors()?)))
            .collect();

        let future_end = future.keys().max().copied();
        let points: Vec<ForecastPoint> = (1..=horizon)
            .map_while(|k| {
                let offset = model.cadence().checked_mul(i32::try_from(k).ok()?)?;
                let timestamp = last.checked_add_signed(offset)?;
                (Some(timestamp) <= future_end).then_some(timestamp)
            })
            .filter_map(|timestamp| {
                let regressors = future.get(&timestamp)?;
                Some(ForecastPoint {
                    timestamp,
                    predicted_traffic_volume: model.predict(timestamp, *regressors).max(0.0),
                })
            })
            .collect();

        if points.is_empty() {
            return Err(RegressionError::MissingFutureRegressors { horizon });
        }
        if points.len() < horizon {
            warn!(
                "Future weather covers only {} of {} forecast steps",
                points.len(),
                horizon
            );
        }
        info!(
            "Regression forecast of {} steps (R² {:.3})",
            points.len(),
            model.r_squared()
        );
        Ok(ModelForecast {
            points,
            requested_horizon: horizon,
            r_squared: model.r_squared(),
        })
    }
}
