//! Joins weather observations and traffic history on exact timestamps.

use crate::types::merged_record::MergedRecord;
use crate::types::observation::{TrafficObservation, WeatherObservation};
use crate::types::weather_category::WeatherCategory;
use chrono::NaiveDateTime;
use log::debug;
use std::collections::BTreeMap;

/// Builds one [`MergedRecord`] per distinct timestamp found in either input, in
/// ascending timestamp order.
///
/// Weather is pivoted into the temperature, rainfall and wind speed fields; other
/// categories only contribute their timestamp. Timestamps must match exactly, no
/// interpolation or resampling takes place.
///
/// The result does not depend on input order. Inputs are sorted first, and when a key
/// repeats (`(timestamp, category)` for weather, `timestamp` for traffic) the last
/// value in that order wins, which for equal keys means the largest value.
pub fn align(weather: &[WeatherObservation], traffic: &[TrafficObservation]) -> Vec<MergedRecord> {
    let mut rows: BTreeMap<NaiveDateTime, MergedRecord> = BTreeMap::new();

    let mut weather: Vec<&WeatherObservation> = weather.iter().collect();
    weather.sort_by(|a, b| {
        (a.timestamp, a.category)
            .cmp(&(b.timestamp, b.category))
            .then(a.value.total_cmp(&b.value))
    });
    for observation in weather {
        let row = rows
            .entry(observation.timestamp)
            .or_insert_with(|| MergedRecord::empty(observation.timestamp));
        let value = Some(observation.value);
        match observation.category {
            WeatherCategory::Temperature => row.temperature = value,
            WeatherCategory::Rainfall => row.rainfall = value,
            WeatherCategory::WindSpeed => row.wind_speed = value,
            _ => {}
        }
    }

    let mut traffic: Vec<&TrafficObservation> = traffic.iter().collect();
    traffic.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.traffic_volume.total_cmp(&b.traffic_volume))
    });
    for observation in traffic {
        rows.entry(observation.timestamp)
            .or_insert_with(|| MergedRecord::empty(observation.timestamp))
            .traffic_volume = Some(observation.traffic_volume);
    }

    let merged: Vec<MergedRecord> = rows.into_values().collect();
    debug!(
        "Aligned {} records, {} complete",
        merged.len(),
        merged.iter().filter(|r| r.is_complete()).count()
    );
    merged
}
