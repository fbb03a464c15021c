use crate::weather::client::{FetchOutcome, WeatherQuery, WeatherSource};
use async_trait::async_trait;
use log::warn;
use std::time::Duration;

/// Retries transient failures of an inner [`WeatherSource`] with linear backoff.
///
/// Only network errors and 5xx statuses are retried. The wait before attempt `n + 1`
/// is `backoff * n`.
#[derive(Debug, Clone)]
pub struct Retrying<S> {
    inner: S,
    max_attempts: u32,
    backoff: Duration,
}

impl<S> Retrying<S> {
    /// `max_attempts` counts the first attempt and is at least 1.
    pub fn new(inner: S, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: WeatherSource> WeatherSource for Retrying<S> {
    async fn fetch(&self, query: &WeatherQuery) -> FetchOutcome {
        let mut attempt = 1;
        loop {
            match self.inner.fetch(query).await {
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        "Weather fetch attempt {}/{} failed: {}",
                        attempt, self.max_attempts, err
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::types::observation::{GridCell, Observations, WeatherObservation};
    use crate::types::weather_category::WeatherCategory;
    use crate::weather::error::FetchError;
    use chrono::{NaiveDate, NaiveTime};
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with `status` until `failures` calls have been made, then succeeds.
    struct Flaky {
        calls: AtomicU32,
        failures: u32,
        status: StatusCode,
    }

    #[async_trait]
    impl WeatherSource for Flaky {
        async fn fetch(&self, query: &WeatherQuery) -> FetchOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(FetchError::HttpStatus {
                    endpoint: "test".to_string(),
                    status: self.status,
                });
            }
            Observations::new(vec![WeatherObservation {
                timestamp: query.base_datetime(),
                category: WeatherCategory::Temperature,
                value: 20.0,
                grid: query.grid,
            }])
            .ok_or(FetchError::EmptyPayload)
        }
    }

    fn query() -> WeatherQuery {
        WeatherQuery::new(
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            GridCell::new(60, 127),
        )
    }

    fn flaky(failures: u32, status: StatusCode) -> Flaky {
        Flaky {
            calls: AtomicU32::new(0),
            failures,
            status,
        }
    }

    #[tokio::test]
    async fn test_recovers_from_server_errors() {
        let source = Retrying::new(flaky(2, StatusCode::BAD_GATEWAY), 3, Duration::ZERO);
        assert!(source.fetch(&query()).await.is_ok());
        assert_eq!(source.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let source = Retrying::new(flaky(5, StatusCode::SERVICE_UNAVAILABLE), 2, Duration::ZERO);
        let err = source.fetch(&query()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::HttpError(503));
        assert_eq!(source.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let source = Retrying::new(flaky(1, StatusCode::UNAUTHORIZED), 4, Duration::ZERO);
        let err = source.fetch(&query()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::HttpError(401));
        assert_eq!(source.inner().calls.load(Ordering::SeqCst), 1);
    }
}
