//! Canonical observation shapes shared by the weather and traffic sources.

use crate::types::weather_category::WeatherCategory;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A KMA forecast grid cell (`nx`, `ny`) on the Lambert conformal projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub x: u16,
    pub y: u16,
}

impl GridCell {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One forecast value for one category at one timestamp.
///
/// Timestamps are minute precision local time as published by the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherObservation {
    pub timestamp: NaiveDateTime,
    pub category: WeatherCategory,
    pub value: f64,
    pub grid: GridCell,
}

/// One historical traffic count. `traffic_volume` is never negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrafficObservation {
    pub timestamp: NaiveDateTime,
    pub traffic_volume: f64,
}

/// A non-empty set of weather observations, sorted by `(timestamp, category)` with
/// at most one observation per key.
///
/// This is the success half of a weather fetch. It cannot be built from an empty
/// vector, so a fetch either yields data or an error.
#[derive(Debug, Clone, PartialEq)]
pub struct Observations(Vec<WeatherObservation>);

impl Observations {
    /// Sorts and de-duplicates `items`. When two observations share a
    /// `(timestamp, category)` key the one appearing later in `items` is kept.
    ///
    /// Returns `None` when `items` is empty.
    pub fn new(mut items: Vec<WeatherObservation>) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        // Stable sort keeps input order within a key, so the retained element is the last one.
        items.sort_by_key(|o| (o.timestamp, o.category));
        items.dedup_by(|current, kept| {
            if current.timestamp == kept.timestamp && current.category == kept.category {
                std::mem::swap(current, kept);
                true
            } else {
                false
            }
        });
        Some(Self(items))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WeatherObservation> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[WeatherObservation] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<WeatherObservation> {
        self.0
    }

    /// All observations at the most recent timestamp that carries a temperature,
    /// rainfall or wind speed value. Timestamps holding only other categories, as
    /// at the tail of a truncated page, are passed over. Without any of those three
    /// categories the most recent timestamp is used.
    pub fn latest_snapshot(&self) -> &[WeatherObservation] {
        let latest = self
            .0
            .iter()
            .rev()
            .find(|o| o.category.is_regressor())
            .or_else(|| self.0.last())
            .map(|o| o.timestamp);
        let Some(latest) = latest else {
            return &[];
        };
        let start = self.0.partition_point(|o| o.timestamp < latest);
        let end = self.0.partition_point(|o| o.timestamp <= latest);
        &self.0[start..end]
    }

    /// The distinct categories present.
    pub fn categories(&self) -> BTreeSet<WeatherCategory> {
        self.0.iter().map(|o| o.category).collect()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.0.first().map(|o| o.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.0.last().map(|o| o.timestamp)
    }
}

impl<'a> IntoIterator for &'a Observations {
    type Item = &'a WeatherObservation;
    type IntoIter = std::slice::Iter<'a, WeatherObservation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl AsRef<[WeatherObservation]> for Observations {
    fn as_ref(&self) -> &[WeatherObservation] {
        &self.0
    }
}
