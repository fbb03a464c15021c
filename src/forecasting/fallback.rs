use crate::config::FallbackRules;
use crate::types::observation::WeatherObservation;
use crate::types::weather_category::WeatherCategory;
use std::fmt;

/// The rule of the ladder that produced an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackRule {
    Rain,
    HighWind,
    Heat,
    Cold,
    Normal,
    NoWeatherData,
}

impl FallbackRule {
    pub fn explanation(&self) -> &'static str {
        match self {
            FallbackRule::Rain => "increase due to rain",
            FallbackRule::HighWind => "decrease due to high wind",
            FallbackRule::Heat => "increase due to heat",
            FallbackRule::Cold => "decrease due to cold",
            FallbackRule::Normal => "normal conditions",
            FallbackRule::NoWeatherData => "no weather data",
        }
    }
}

impl fmt::Display for FallbackRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.explanation())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackEstimate {
    pub value: f64,
    pub rule: FallbackRule,
}

impl FallbackEstimate {
    pub fn explanation(&self) -> &'static str {
        self.rule.explanation()
    }
}

/// Estimates traffic from a weather snapshot with a fixed threshold ladder.
///
/// Rules are checked in order, the first match decides:
///
/// | condition                   | adjustment |
/// |-----------------------------|------------|
/// | rainfall > 5 mm             | +100       |
/// | wind speed > 10 m/s         | -50        |
/// | temperature > 30 °C         | +200       |
/// | temperature < 10 °C         | -100       |
/// | otherwise                   | 0          |
///
/// Thresholds and adjustments come from [`FallbackRules`]. A category missing from the
/// snapshot never matches. Without any temperature, rainfall or wind speed the
/// baseline is returned unchanged.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedFallbackPredictor {
    rules: FallbackRules,
}

impl RuleBasedFallbackPredictor {
    pub fn new(rules: FallbackRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &FallbackRules {
        &self.rules
    }

    /// Applies the ladder to `weather`. When a category occurs more than once the
    /// observation with the latest timestamp is used.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use highway_forecast::{
    ///     FallbackRule, GridCell, RuleBasedFallbackPredictor, WeatherCategory, WeatherObservation,
    /// };
    ///
    /// let at = NaiveDate::from_ymd_opt(2024, 7, 1)
    ///     .unwrap()
    ///     .and_hms_opt(9, 0, 0)
    ///     .unwrap();
    /// let weather = [WeatherObservation {
    ///     timestamp: at,
    ///     category: WeatherCategory::Rainfall,
    ///     value: 12.0,
    ///     grid: GridCell::new(60, 127),
    /// }];
    ///
    /// let estimate = RuleBasedFallbackPredictor::default().predict(&weather, 1500.0);
    /// assert_eq!(estimate.rule, FallbackRule::Rain);
    /// assert_eq!(estimate.value, 1600.0);
    /// ```
    pub fn predict(&self, weather: &[WeatherObservation], baseline: f64) -> FallbackEstimate {
        let latest = |category: WeatherCategory| {
            weather
                .iter()
                .filter(|o| o.category == category)
                .max_by_key(|o| o.timestamp)
                .map(|o| o.value)
        };
        let temperature = latest(WeatherCategory::Temperature);
        let rainfall = latest(WeatherCategory::Rainfall);
        let wind_speed = latest(WeatherCategory::WindSpeed);

        let rules = &self.rules;
        let (rule, delta) = if temperature.is_none() && rainfall.is_none() && wind_speed.is_none() {
            (FallbackRule::NoWeatherData, 0.0)
        } else if rainfall.is_some_and(|v| v > rules.rain_threshold_mm) {
            (FallbackRule::Rain, rules.rain_delta)
        } else if wind_speed.is_some_and(|v| v > rules.wind_threshold_ms) {
            (FallbackRule::HighWind, rules.wind_delta)
        } else if temperature.is_some_and(|v| v > rules.heat_threshold_c) {
            (FallbackRule::Heat, rules.heat_delta)
        } else if temperature.is_some_and(|v| v < rules.cold_threshold_c) {
            (FallbackRule::Cold, rules.cold_delta)
        } else {
            (FallbackRule::Normal, 0.0)
        };

        FallbackEstimate {
            value: baseline + delta,
            rule,
        }
    }
}
