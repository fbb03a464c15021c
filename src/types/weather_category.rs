//! Defines the `WeatherCategory` enum, mapping the category codes published by the
//! KMA village and ultra-short forecast services to descriptive variants.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A forecast or observation category as reported in the `category` field of a
/// forecast item.
///
/// The village forecast (`getVilageFcst`) and the ultra-short services
/// (`getUltraSrtFcst`, `getUltraSrtNcst`) use slightly different codes for the same
/// quantity (`TMP` vs `T1H`, `PCP` vs `RN1`). Both spellings map to the same variant.
///
/// Only [`Temperature`](WeatherCategory::Temperature),
/// [`Rainfall`](WeatherCategory::Rainfall) and [`WindSpeed`](WeatherCategory::WindSpeed)
/// feed the forecasting models; the remaining variants are kept so that callers
/// can inspect the full payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCategory {
    /// `T1H` / `TMP`: air temperature in °C.
    Temperature,
    /// `RN1` / `PCP`: precipitation over one hour in mm.
    Rainfall,
    /// `WSD`: wind speed in m/s.
    WindSpeed,
    /// `REH`: relative humidity in %.
    Humidity,
    /// `SKY`: sky state code (1 clear, 3 mostly cloudy, 4 overcast).
    SkyState,
    /// `PTY`: precipitation type code.
    PrecipitationType,
    /// `POP`: probability of precipitation in %.
    PrecipitationProbability,
    /// `VEC`: wind direction in degrees.
    WindDirection,
    /// `UUU`: east-west wind component in m/s.
    WindEastWest,
    /// `VVV`: north-south wind component in m/s.
    WindNorthSouth,
    /// `SNO`: snowfall over one hour in cm.
    Snowfall,
    /// `LGT`: lightning in kA.
    Lightning,
    /// `WAV`: wave height in m.
    WaveHeight,
    /// `TMN`: daily minimum temperature in °C.
    DailyMinTemperature,
    /// `TMX`: daily maximum temperature in °C.
    DailyMaxTemperature,
}

impl WeatherCategory {
    /// Maps a provider category code to a variant.
    ///
    /// Returns `None` for codes this crate does not recognise.
    ///
    /// ```
    /// use highway_forecast::WeatherCategory;
    ///
    /// assert_eq!(WeatherCategory::from_code("T1H"), Some(WeatherCategory::Temperature));
    /// assert_eq!(WeatherCategory::from_code("TMP"), Some(WeatherCategory::Temperature));
    /// assert_eq!(WeatherCategory::from_code("XYZ"), None);
    /// ```
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "T1H" | "TMP" => Some(WeatherCategory::Temperature),
            "RN1" | "PCP" => Some(WeatherCategory::Rainfall),
            "WSD" => Some(WeatherCategory::WindSpeed),
            "REH" => Some(WeatherCategory::Humidity),
            "SKY" => Some(WeatherCategory::SkyState),
            "PTY" => Some(WeatherCategory::PrecipitationType),
            "POP" => Some(WeatherCategory::PrecipitationProbability),
            "VEC" => Some(WeatherCategory::WindDirection),
            "UUU" => Some(WeatherCategory::WindEastWest),
            "VVV" => Some(WeatherCategory::WindNorthSouth),
            "SNO" => Some(WeatherCategory::Snowfall),
            "LGT" => Some(WeatherCategory::Lightning),
            "WAV" => Some(WeatherCategory::WaveHeight),
            "TMN" => Some(WeatherCategory::DailyMinTemperature),
            "TMX" => Some(WeatherCategory::DailyMaxTemperature),
            _ => None,
        }
    }

    /// The code used by the ultra-short services, or the village code where only one exists.
    pub fn code(&self) -> &'static str {
        match self {
            WeatherCategory::Temperature => "T1H",
            WeatherCategory::Rainfall => "RN1",
            WeatherCategory::WindSpeed => "WSD",
            WeatherCategory::Humidity => "REH",
            WeatherCategory::SkyState => "SKY",
            WeatherCategory::PrecipitationType => "PTY",
            WeatherCategory::PrecipitationProbability => "POP",
            WeatherCategory::WindDirection => "VEC",
            WeatherCategory::WindEastWest => "UUU",
            WeatherCategory::WindNorthSouth => "VVV",
            WeatherCategory::Snowfall => "SNO",
            WeatherCategory::Lightning => "LGT",
            WeatherCategory::WaveHeight => "WAV",
            WeatherCategory::DailyMinTemperature => "TMN",
            WeatherCategory::DailyMaxTemperature => "TMX",
        }
    }

    /// Whether values of this category are published as text buckets such as `"1mm 미만"`.
    pub(crate) fn is_precipitation_amount(&self) -> bool {
        matches!(self, WeatherCategory::Rainfall | WeatherCategory::Snowfall)
    }

    /// Whether this category is one of the three exogenous regressors.
    pub fn is_regressor(&self) -> bool {
        matches!(
            self,
            WeatherCategory::Temperature | WeatherCategory::Rainfall | WeatherCategory::WindSpeed
        )
    }

    fn name(&self) -> &'static str {
        match self {
            WeatherCategory::Temperature => "temperature",
            WeatherCategory::Rainfall => "rainfall",
            WeatherCategory::WindSpeed => "wind_speed",
            WeatherCategory::Humidity => "humidity",
            WeatherCategory::SkyState => "sky_state",
            WeatherCategory::PrecipitationType => "precipitation_type",
            WeatherCategory::PrecipitationProbability => "precipitation_probability",
            WeatherCategory::WindDirection => "wind_direction",
            WeatherCategory::WindEastWest => "wind_east_west",
            WeatherCategory::WindNorthSouth => "wind_north_south",
            WeatherCategory::Snowfall => "snowfall",
            WeatherCategory::Lightning => "lightning",
            WeatherCategory::WaveHeight => "wave_height",
            WeatherCategory::DailyMinTemperature => "daily_min_temperature",
            WeatherCategory::DailyMaxTemperature => "daily_max_temperature",
        }
    }
}

impl fmt::Display for WeatherCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
