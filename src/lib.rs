//! Short-horizon highway traffic forecasts conditioned on KMA village weather forecasts.
//!
//! A run fetches the forecast for one grid cell, joins it with historical traffic
//! counts, fits a weather-conditioned regression and predicts the next few steps.
//! When any step fails, a rule-based estimate built from the latest weather snapshot
//! and the latest known traffic volume is returned instead, together with an
//! explanation of what went wrong.
//!
//! ```no_run
//! use highway_forecast::{
//!     ForecastConfig, ForecastOrchestrator, ForecastParams, TrafficSourceConfig,
//!     WeatherClientConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ForecastConfig::builder()
//!     .weather(WeatherClientConfig::from_env()?)
//!     .traffic(TrafficSourceConfig::builder().path("data/traffic.csv").build())
//!     .build();
//! let orchestrator = ForecastOrchestrator::from_config(config)?;
//!
//! let params = ForecastParams::builder()
//!     .grid_x(60)
//!     .grid_y(127)
//!     .base_date("20240701")
//!     .base_time("0600")
//!     .horizon(7)
//!     .build();
//! let result = orchestrator.run(&params).await?;
//! for point in &result.horizon_points {
//!     println!("{}: {:.0}", point.timestamp, point.predicted_traffic_volume);
//! }
//! # Ok(())
//! # }
//! ```

mod align;
mod config;
mod error;
mod forecasting;
mod orchestrator;
mod traffic;
mod types;
mod utils;
mod weather;

#[cfg(test)]
mod test_support;

pub use align::align;
pub use config::*;
pub use error::{FailureKind, ForecastError};
pub use orchestrator::{ForecastOrchestrator, ForecastParams, MAX_HORIZON};

pub use types::forecast_result::*;
pub use types::merged_record::MergedRecord;
pub use types::observation::*;
pub use types::weather_category::WeatherCategory;

pub use weather::client::{FetchOutcome, WeatherClient, WeatherQuery, WeatherSource};
pub use weather::payload::{parse_payload, PayloadFormat};
pub use weather::retry::Retrying;
pub use weather::transport::{SecurityLevel, TlsBackend, TlsPolicy};

pub use traffic::store::{CsvTrafficStore, TrafficSource};

pub use forecasting::fallback::{FallbackEstimate, FallbackRule, RuleBasedFallbackPredictor};
pub use forecasting::regression::{
    FittedModel, ModelForecast, RegressionForecaster, TrafficForecaster,
};

pub use forecasting::error::RegressionError;
pub use traffic::error::TrafficDataError;
pub use weather::error::{FetchError, TransportError};
