//! Configuration structs for every component.
//!
//! All structs deserialize with `serde`, so the embedding application may load them
//! from any format, and expose `bon` builders for programmatic construction.

use crate::weather::payload::PayloadFormat;
use crate::weather::transport::SecurityLevel;
use bon::Builder;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://apis.data.go.kr/1360000/VilageFcstInfoService_2.0";
pub const DEFAULT_ENDPOINT: &str = "getVilageFcst";
pub const SERVICE_KEY_ENV: &str = "KMA_SERVICE_KEY";
pub const BASE_URL_ENV: &str = "KMA_BASE_URL";

const MAX_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Service key must not be empty")]
    MissingServiceKey,

    #[error("Base URL must start with http:// or https://, got '{0}'")]
    InvalidBaseUrl(String),

    #[error("Endpoint name must not be empty")]
    MissingEndpoint,

    #[error("Timeout must be between 1 and 60 seconds, got {0}")]
    InvalidTimeout(u64),

    #[error("Number of rows per page must be positive")]
    InvalidRowCount,

    #[error("Minimum training rows must be at least 2, got {0}")]
    InvalidMinTrainingRows(usize),

    #[error("Ridge penalty must be finite and non-negative, got {0}")]
    InvalidRidgePenalty(f64),

    #[error("Fallback step must be at least one minute, got {0} minutes")]
    InvalidFallbackStep(i64),

    #[error("Environment variable '{0}' is not set")]
    MissingEnv(&'static str),
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_num_of_rows() -> u32 {
    1000
}

fn default_page_no() -> u32 {
    1
}

/// Settings for [`WeatherClient`](crate::WeatherClient).
///
/// `service_key` is sent verbatim: the portal issues keys already percent-encoded.
#[derive(Clone, Deserialize, Builder)]
pub struct WeatherClientConfig {
    #[builder(into)]
    pub service_key: String,
    #[serde(default = "default_base_url")]
    #[builder(into, default = default_base_url())]
    pub base_url: String,
    #[serde(default = "default_endpoint")]
    #[builder(into, default = default_endpoint())]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    #[builder(default = default_timeout_secs())]
    pub timeout_secs: u64,
    #[serde(default = "default_num_of_rows")]
    #[builder(default = default_num_of_rows())]
    pub num_of_rows: u32,
    #[serde(default = "default_page_no")]
    #[builder(default = default_page_no())]
    pub page_no: u32,
    #[serde(default)]
    #[builder(default)]
    pub data_type: PayloadFormat,
    #[serde(default)]
    #[builder(default)]
    pub security_level: SecurityLevel,
}

impl WeatherClientConfig {
    /// Reads the service key from `KMA_SERVICE_KEY` and, if set, the base URL from
    /// `KMA_BASE_URL`. Everything else takes its default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let service_key =
            std::env::var(SERVICE_KEY_ENV).map_err(|_| ConfigError::MissingEnv(SERVICE_KEY_ENV))?;
        let base_url = std::env::var(BASE_URL_ENV).unwrap_or_else(|_| default_base_url());
        let config = Self::builder()
            .service_key(service_key)
            .base_url(base_url)
            .build();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_key.trim().is_empty() {
            return Err(ConfigError::MissingServiceKey);
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        if self.endpoint.trim_matches('/').is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        if self.timeout_secs == 0 || self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }
        if self.num_of_rows == 0 || self.page_no == 0 {
            return Err(ConfigError::InvalidRowCount);
        }
        Ok(())
    }

    /// `{base_url}/{endpoint}` without a query string.
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint.trim_matches('/')
        )
    }
}

impl fmt::Debug for WeatherClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherClientConfig")
            .field("service_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .field("num_of_rows", &self.num_of_rows)
            .field("page_no", &self.page_no)
            .field("data_type", &self.data_type)
            .field("security_level", &self.security_level)
            .finish()
    }
}

/// Names of the timestamp and volume columns in the traffic history CSV.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Builder)]
pub struct TrafficColumns {
    #[builder(into)]
    pub timestamp: String,
    #[builder(into)]
    pub volume: String,
}

impl Default for TrafficColumns {
    fn default() -> Self {
        Self {
            timestamp: "date".to_string(),
            volume: "traffic_volume".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Builder)]
pub struct TrafficSourceConfig {
    #[builder(into)]
    pub path: PathBuf,
    #[serde(default)]
    #[builder(default)]
    pub columns: TrafficColumns,
}

fn default_min_training_rows() -> usize {
    10
}

fn default_fourier_order() -> usize {
    3
}

fn default_ridge_penalty() -> f64 {
    1e-4
}

#[derive(Debug, Clone, PartialEq, Deserialize, Builder)]
pub struct RegressionConfig {
    /// Complete rows required before a model is fitted.
    #[serde(default = "default_min_training_rows")]
    #[builder(default = default_min_training_rows())]
    pub min_training_rows: usize,
    /// Number of sine/cosine pairs for the 24 hour cycle.
    #[serde(default = "default_fourier_order")]
    #[builder(default = default_fourier_order())]
    pub daily_fourier_order: usize,
    /// Number of sine/cosine pairs for the 7 day cycle.
    #[serde(default = "default_fourier_order")]
    #[builder(default = default_fourier_order())]
    pub weekly_fourier_order: usize,
    /// Ridge penalty per training row, applied to the standardised features.
    #[serde(default = "default_ridge_penalty")]
    #[builder(default = default_ridge_penalty())]
    pub ridge_penalty: f64,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RegressionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_training_rows < 2 {
            return Err(ConfigError::InvalidMinTrainingRows(self.min_training_rows));
        }
        if !self.ridge_penalty.is_finite() || self.ridge_penalty < 0.0 {
            return Err(ConfigError::InvalidRidgePenalty(self.ridge_penalty));
        }
        Ok(())
    }
}

/// Thresholds and deltas of the fallback rule ladder.
///
/// Rules are checked in declaration order and the first match wins: rain, wind,
/// heat, cold.
#[derive(Debug, Clone, PartialEq, Deserialize, Builder)]
#[serde(default)]
pub struct FallbackRules {
    #[builder(default = 5.0)]
    pub rain_threshold_mm: f64,
    #[builder(default = 100.0)]
    pub rain_delta: f64,
    #[builder(default = 10.0)]
    pub wind_threshold_ms: f64,
    #[builder(default = -50.0)]
    pub wind_delta: f64,
    #[builder(default = 30.0)]
    pub heat_threshold_c: f64,
    #[builder(default = 200.0)]
    pub heat_delta: f64,
    #[builder(default = 10.0)]
    pub cold_threshold_c: f64,
    #[builder(default = -100.0)]
    pub cold_delta: f64,
}

impl Default for FallbackRules {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn default_fallback_step_minutes() -> i64 {
    60
}

/// Everything [`ForecastOrchestrator::from_config`](crate::ForecastOrchestrator::from_config) needs.
#[derive(Debug, Clone, Deserialize, Builder)]
pub struct ForecastConfig {
    pub weather: WeatherClientConfig,
    pub traffic: TrafficSourceConfig,
    #[serde(default)]
    #[builder(default)]
    pub regression: RegressionConfig,
    #[serde(default)]
    #[builder(default)]
    pub fallback: FallbackRules,
    /// Baseline used by the fallback when no traffic history could be read.
    #[serde(default)]
    #[builder(default)]
    pub default_baseline: f64,
    /// Spacing of fallback forecast points.
    #[serde(default = "default_fallback_step_minutes")]
    #[builder(default = default_fallback_step_minutes())]
    pub fallback_step_minutes: i64,
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weather.validate()?;
        self.regression.validate()?;
        if self.fallback_step_minutes < 1 {
            return Err(ConfigError::InvalidFallbackStep(self.fallback_step_minutes));
        }
        Ok(())
    }
}
