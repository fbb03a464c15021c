//! Runs one forecast: fetch weather, load traffic, align, forecast, and fall back to the
//! rule ladder when any of those steps fails.

use crate::align::align;
use crate::config::ForecastConfig;
use crate::error::{FailureKind, ForecastError};
use crate::forecasting::fallback::RuleBasedFallbackPredictor;
use crate::forecasting::regression::{ModelForecast, RegressionForecaster, TrafficForecaster};
use crate::traffic::store::{CsvTrafficStore, TrafficSource};
use crate::types::forecast_result::{ForecastOrigin, ForecastPoint, ForecastResult};
use crate::types::merged_record::MergedRecord;
use crate::types::observation::{GridCell, Observations};
use crate::utils::parse_provider_time;
use crate::weather::client::{WeatherClient, WeatherQuery, WeatherSource};
use bon::{bon, Builder};
use chrono::{Duration, NaiveDate};
use log::{debug, info, warn};

/// Longest horizon a single run accepts, in steps.
pub const MAX_HORIZON: usize = 240;

/// Inbound parameters of a forecast run.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct ForecastParams {
    pub grid_x: u16,
    pub grid_y: u16,
    /// Issuance date, `YYYYMMDD`.
    #[builder(into)]
    pub base_date: String,
    /// Issuance time, `HHMM`.
    #[builder(into)]
    pub base_time: String,
    /// Number of forecast points wanted, `1..=MAX_HORIZON`.
    pub horizon: usize,
}

impl ForecastParams {
    /// Checks the parameters and converts them into a weather query.
    pub fn to_query(&self) -> Result<WeatherQuery, ForecastError> {
        if self.horizon == 0 {
            return Err(ForecastError::InvalidRequest(
                "horizon must be at least 1".to_string(),
            ));
        }
        if self.horizon > MAX_HORIZON {
            return Err(ForecastError::InvalidRequest(format!(
                "horizon {} exceeds the maximum of {MAX_HORIZON} steps",
                self.horizon
            )));
        }
        if self.grid_x == 0 || self.grid_y == 0 {
            return Err(ForecastError::InvalidRequest(format!(
                "grid cell ({}, {}) is outside the forecast grid",
                self.grid_x, self.grid_y
            )));
        }
        let base_date = NaiveDate::parse_from_str(self.base_date.trim(), "%Y%m%d").map_err(|_| {
            ForecastError::InvalidRequest(format!("base date '{}' is not YYYYMMDD", self.base_date))
        })?;
        if self.base_time.trim().len() != 4 {
            return Err(ForecastError::InvalidRequest(format!(
                "base time '{}' is not HHMM",
                self.base_time
            )));
        }
        let base_time = parse_provider_time(&self.base_time).ok_or_else(|| {
            ForecastError::InvalidRequest(format!("base time '{}' is not HHMM", self.base_time))
        })?;
        Ok(WeatherQuery::new(
            base_date,
            base_time,
            GridCell::new(self.grid_x, self.grid_y),
        ))
    }
}

/// Progress of a run. Any failure moves to `Fallback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Fetch,
    Align,
    Forecast,
    Fallback,
}

/// Why a run ended up on the fallback path.
#[derive(Debug, Clone)]
struct FallbackCause {
    kind: FailureKind,
    detail: String,
}

impl FallbackCause {
    fn new(kind: FailureKind, error: &dyn std::error::Error) -> Self {
        Self {
            kind,
            detail: error.to_string(),
        }
    }
}

/// Coordinates a weather source, a traffic source and a forecaster.
///
/// The regression path is taken only when the weather fetch, the traffic load and
/// the forecaster all succeed. Every other outcome produces a fallback result, so
/// [`run`](Self::run) only returns an error for invalid parameters.
#[derive(Debug)]
pub struct ForecastOrchestrator<W, T, F> {
    weather: W,
    traffic: T,
    forecaster: F,
    fallback: RuleBasedFallbackPredictor,
    default_baseline: f64,
    fallback_step: Duration,
}

#[bon]
impl<W, T, F> ForecastOrchestrator<W, T, F>
where
    W: WeatherSource,
    T: TrafficSource,
    F: TrafficForecaster,
{
    /// `default_baseline` is the fallback baseline when no traffic history could be
    /// read; `fallback_step` spaces the fallback points (one hour unless set).
    #[builder]
    pub fn new(
        weather: W,
        traffic: T,
        forecaster: F,
        #[builder(default)] fallback: RuleBasedFallbackPredictor,
        #[builder(default)] default_baseline: f64,
        #[builder(default = Duration::hours(1))] fallback_step: Duration,
    ) -> Self {
        Self {
            weather,
            traffic,
            forecaster,
            fallback,
            default_baseline,
            fallback_step,
        }
    }

    /// Runs one forecast from fetch to result.
    ///
    /// # Arguments
    ///
    /// * `params` - Grid cell, issuance date and time, and the number of steps wanted.
    ///
    /// # Returns
    ///
    /// A [`ForecastResult`] from the regression when every stage succeeds, otherwise a
    /// fallback result whose `explanation` names the failure and the rule applied.
    ///
    /// # Errors
    ///
    /// Only [`ForecastError::InvalidRequest`], raised before any request is sent.
    ///
    /// # Examples
    ///
    /// ```
    /// use async_trait::async_trait;
    /// use highway_forecast::{
    ///     CsvTrafficStore, FetchError, FetchOutcome, ForecastOrchestrator, ForecastParams,
    ///     RegressionForecaster, TrafficColumns, WeatherQuery, WeatherSource,
    /// };
    ///
    /// struct Offline;
    ///
    /// #[async_trait]
    /// impl WeatherSource for Offline {
    ///     async fn fetch(&self, _query: &WeatherQuery) -> FetchOutcome {
    ///         Err(FetchError::EmptyPayload)
    ///     }
    /// }
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), highway_forecast::ForecastError> {
    /// let orchestrator = ForecastOrchestrator::builder()
    ///     .weather(Offline)
    ///     .traffic(CsvTrafficStore::new("no-such-history.csv", TrafficColumns::default()))
    ///     .forecaster(RegressionForecaster::default())
    ///     .default_baseline(1200.0)
    ///     .build();
    ///
    /// let params = ForecastParams::builder()
    ///     .grid_x(60)
    ///     .grid_y(127)
    ///     .base_date("20240701")
    ///     .base_time("0600")
    ///     .horizon(3)
    ///     .build();
    /// let result = orchestrator.run(&params).await?;
    ///
    /// assert!(result.is_fallback());
    /// assert_eq!(result.values(), vec![1200.0; 3]);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run(&self, params: &ForecastParams) -> Result<ForecastResult, ForecastError> {
        let query = params.to_query()?;
        let horizon = params.horizon;
        info!(
            "Forecasting {} steps for grid {} issued {}",
            horizon,
            query.grid,
            query.base_datetime()
        );

        let mut stage = Stage::Fetch;
        let mut weather: Option<Observations> = None;
        let mut baseline: Option<f64> = None;
        let mut records: Vec<MergedRecord> = Vec::new();
        let mut cause: Option<FallbackCause> = None;

        loop {
            debug!("Forecast stage {:?}", stage);
            stage = match stage {
                Stage::Fetch => match self.weather.fetch(&query).await {
                    Ok(observations) => {
                        weather = Some(observations);
                        Stage::Align
                    }
                    Err(err) => {
                        cause = Some(FallbackCause::new(err.kind(), &err));
                        Stage::Fallback
                    }
                },
                Stage::Align => match self.traffic.load() {
                    Ok(history) => {
                        baseline = history.last().map(|o| o.traffic_volume);
                        let observations = weather.as_ref().map(|w| w.as_slice()).unwrap_or_default();
                        records = align(observations, &history);
                        Stage::Forecast
                    }
                    Err(err) => {
                        cause = Some(FallbackCause::new(err.kind(), &err));
                        Stage::Fallback
                    }
                },
                Stage::Forecast => match self.forecaster.fit_predict(&records, horizon) {
                    Ok(forecast) => return Ok(regression_result(forecast)),
                    Err(err) => {
                        cause = Some(FallbackCause::new(err.kind(), &err));
                        Stage::Fallback
                    }
                },
                Stage::Fallback => {
                    return Ok(self.fallback_result(&query, horizon, weather.as_ref(), baseline, cause));
                }
            };
        }
    }

    fn fallback_result(
        &self,
        query: &WeatherQuery,
        horizon: usize,
        weather: Option<&Observations>,
        baseline: Option<f64>,
        cause: Option<FallbackCause>,
    ) -> ForecastResult {
        let snapshot = weather.map(|w| w.latest_snapshot()).unwrap_or_default();
        let baseline = baseline.unwrap_or(self.default_baseline);
        let estimate = self.fallback.predict(snapshot, baseline);
        let value = estimate.value.max(0.0);

        let trigger = match cause {
            Some(cause) => format!("{}: {}", cause.kind, cause.detail),
            None => "unknown".to_string(),
        };
        let explanation = format!("{}; {}", trigger, estimate.explanation());
        warn!("Using fallback forecast ({})", explanation);

        let anchor = query.base_datetime();
        let horizon_points = (1..=horizon)
            .filter_map(|k| {
                let offset = self.fallback_step.checked_mul(i32::try_from(k).ok()?)?;
                Some(ForecastPoint {
                    timestamp: anchor.checked_add_signed(offset)?,
                    predicted_traffic_volume: value,
                })
            })
            .collect();
        ForecastResult {
            origin: ForecastOrigin::Fallback,
            horizon_points,
            explanation: Some(explanation),
            warnings: Vec::new(),
        }
    }
}

fn regression_result(forecast: ModelForecast) -> ForecastResult {
    let mut warnings = Vec::new();
    if forecast.is_truncated() {
        warnings.push(format!(
            "horizon truncated to {} of {} steps: future weather missing",
            forecast.points.len(),
            forecast.requested_horizon
        ));
    }
    ForecastResult {
        origin: ForecastOrigin::Regression,
        horizon_points: forecast.points,
        explanation: None,
        warnings,
    }
}

impl ForecastOrchestrator<WeatherClient, CsvTrafficStore, RegressionForecaster> {
    /// Wires the stock components together from a validated configuration.
    pub fn from_config(config: ForecastConfig) -> Result<Self, ForecastError> {
        config.validate()?;
        let traffic = CsvTrafficStore::from_config(&config.traffic);
        Ok(Self::builder()
            .weather(WeatherClient::new(config.weather)?)
            .traffic(traffic)
            .forecaster(RegressionForecaster::new(config.regression))
            .fallback(RuleBasedFallbackPredictor::new(config.fallback))
            .default_baseline(config.default_baseline)
            .fallback_step(Duration::minutes(config.fallback_step_minutes))
            .build())
    }
}
