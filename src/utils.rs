use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

const DATETIME_FORMATS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y%m%d%H%M",
    "%Y%m%d %H%M",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d"];

/// Parses the timestamp spellings found in traffic exports, truncated to the minute.
pub(crate) fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .map(|date| date.and_time(NaiveTime::MIN))
        })
        .map(truncate_to_minute)
}

pub(crate) fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Parses a provider `YYYYMMDD` date and `HHMM` time. Times shorter than four digits
/// are left-padded, since numeric JSON fields drop leading zeros (`600` for `0600`).
pub(crate) fn parse_provider_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y%m%d").ok()?;
    let time = parse_provider_time(time)?;
    Some(date.and_time(time))
}

pub(crate) fn parse_provider_time(time: &str) -> Option<NaiveTime> {
    let time = time.trim();
    if time.is_empty() || time.len() > 4 || !time.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    NaiveTime::parse_from_str(&format!("{time:0>4}"), "%H%M").ok()
}
