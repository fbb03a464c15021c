use crate::config::WeatherClientConfig;
use crate::error::ForecastError;
use crate::types::observation::{GridCell, Observations};
use crate::weather::error::{FetchError, TransportError};
use crate::weather::payload::{parse_payload, PayloadFormat};
use crate::weather::transport::TlsPolicy;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, info, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;

/// Either a non-empty set of observations or a classified failure.
pub type FetchOutcome = Result<Observations, FetchError>;

/// Identifies one forecast issuance for one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeatherQuery {
    pub base_date: NaiveDate,
    pub base_time: NaiveTime,
    pub grid: GridCell,
}

impl WeatherQuery {
    pub fn new(base_date: NaiveDate, base_time: NaiveTime, grid: GridCell) -> Self {
        Self {
            base_date,
            base_time,
            grid,
        }
    }

    /// The issuance time as a single timestamp.
    pub fn base_datetime(&self) -> NaiveDateTime {
        self.base_date.and_time(self.base_time)
    }

    fn base_date_param(&self) -> String {
        self.base_date.format("%Y%m%d").to_string()
    }

    fn base_time_param(&self) -> String {
        self.base_time.format("%H%M").to_string()
    }
}

/// Anything that can produce weather observations for a query.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch(&self, query: &WeatherQuery) -> FetchOutcome;
}

/// Client for the KMA short-term forecast service.
///
/// Each call to [`fetch`](WeatherSource::fetch) performs exactly one HTTP request,
/// bounded by the configured timeout. Wrap the client in
/// [`Retrying`](crate::Retrying) to retry transient failures.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    config: WeatherClientConfig,
    http: Client,
}

impl WeatherClient {
    /// Builds a client using the config's own [`SecurityLevel`](crate::SecurityLevel).
    pub fn new(config: WeatherClientConfig) -> Result<Self, ForecastError> {
        let policy = config.security_level;
        Self::with_policy(config, &policy)
    }

    /// Builds a client whose TLS setup is supplied by `policy`.
    pub fn with_policy(
        config: WeatherClientConfig,
        policy: &dyn TlsPolicy,
    ) -> Result<Self, ForecastError> {
        config.validate()?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let builder = Client::builder().timeout(timeout).connect_timeout(timeout);
        let http = policy
            .apply(builder)?
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &WeatherClientConfig {
        &self.config
    }

    /// The full request URL. The service key is inserted verbatim, everything else
    /// is plain ASCII.
    fn request_url(&self, query: &WeatherQuery) -> String {
        format!(
            "{}?serviceKey={}&numOfRows={}&pageNo={}&dataType={}&base_date={}&base_time={}&nx={}&ny={}",
            self.config.endpoint_url(),
            self.config.service_key.trim(),
            self.config.num_of_rows,
            self.config.page_no,
            self.config.data_type.query_value(),
            query.base_date_param(),
            query.base_time_param(),
            query.grid.x,
            query.grid.y,
        )
    }
}

#[async_trait]
impl WeatherSource for WeatherClient {
    async fn fetch(&self, query: &WeatherQuery) -> FetchOutcome {
        let endpoint = self.config.endpoint_url();
        debug!(
            "Requesting {} forecast from {} for grid {} issued {}",
            self.config.data_type,
            endpoint,
            query.grid,
            query.base_datetime()
        );

        let response = self
            .http
            .get(self.request_url(query))
            .send()
            .await
            .map_err(|e| FetchError::network(&endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Weather request to {} returned {}", endpoint, status);
            return Err(FetchError::HttpStatus { endpoint, status });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::network(&endpoint, e))?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyPayload);
        }

        let format = PayloadFormat::detect(content_type.as_deref(), &body).ok_or_else(|| {
            FetchError::parse(
                self.config.data_type,
                format!(
                    "unrecognised response (content type {})",
                    content_type.as_deref().unwrap_or("missing")
                ),
            )
        })?;
        let observations = parse_payload(format, &body, query.grid)?;
        info!(
            "Fetched {} weather observations for grid {} ({} categories)",
            observations.len(),
            query.grid,
            observations.categories().len()
        );
        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::test_support::{json_forecast_body, serve_once, serve_silently, unused_local_url};
    use crate::types::weather_category::WeatherCategory;
    use crate::weather::transport::SecurityLevel;

    fn query() -> WeatherQuery {
        WeatherQuery::new(
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            GridCell::new(60, 127),
        )
    }

    fn client(base_url: String) -> WeatherClient {
        let config = WeatherClientConfig::builder()
            .service_key("test%2Bkey%3D%3D")
            .base_url(base_url)
            .timeout_secs(5)
            .build();
        WeatherClient::new(config).unwrap()
    }

    #[test]
    fn test_request_url_keeps_key_verbatim() {
        let client = client("http://localhost:9".to_string());
        let url = client.request_url(&query());
        assert_eq!(
            url,
            "http://localhost:9/getVilageFcst?serviceKey=test%2Bkey%3D%3D&numOfRows=1000&pageNo=1\
             &dataType=JSON&base_date=20240701&base_time=0600&nx=60&ny=127"
        );
    }

    #[test]
    fn test_construction_rejects_empty_key() {
        let config = WeatherClientConfig::builder().service_key("").build();
        let err = WeatherClient::with_policy(config, &SecurityLevel::Strict).unwrap_err();
        assert!(matches!(err, ForecastError::Config(_)));
    }

    #[tokio::test]
    async fn test_fetch_json() -> Result<(), FetchError> {
        let body = json_forecast_body(&[
            ("T1H", "20240701", "0700", "24"),
            ("RN1", "20240701", "0700", "강수없음"),
            ("WSD", "20240701", "0700", "2.1"),
        ]);
        let base_url = serve_once("200 OK", "application/json;charset=UTF-8", body).await;

        let observations = client(base_url).fetch(&query()).await?;
        assert_eq!(observations.len(), 3);
        assert!(observations
            .categories()
            .contains(&WeatherCategory::Rainfall));
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_xml_by_sniffing() -> Result<(), FetchError> {
        let body = "<response><header><resultCode>00</resultCode></header><body><items>\
            <item><category>T1H</category><fcstDate>20240701</fcstDate><fcstTime>0700</fcstTime>\
            <fcstValue>24</fcstValue></item></items></body></response>"
            .to_string();
        let base_url = serve_once("200 OK", "text/plain", body).await;

        let observations = client(base_url).fetch(&query()).await?;
        assert_eq!(observations.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let base_url = serve_once("503 Service Unavailable", "text/plain", "busy".to_string()).await;
        let err = client(base_url).fetch(&query()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::HttpError(503));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_empty_body() {
        let base_url = serve_once("200 OK", "application/json", String::new()).await;
        let err = client(base_url).fetch(&query()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::EmptyPayload);
    }

    #[tokio::test]
    async fn test_unrecognised_body() {
        let base_url = serve_once("200 OK", "text/plain", "SERVICE ERROR".to_string()).await;
        let err = client(base_url).fetch(&query()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ParseError);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let err = client(unused_local_url().await)
            .fetch(&query())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::NetworkError);
        assert!(!err.to_string().contains("serviceKey"));
    }

    #[tokio::test]
    async fn test_timeout_is_network_error() {
        let base_url = serve_silently(Duration::from_secs(10)).await;
        let config = WeatherClientConfig::builder()
            .service_key("test-key")
            .base_url(base_url)
            .timeout_secs(1)
            .build();
        let client = WeatherClient::new(config).unwrap();

        let started = std::time::Instant::now();
        let err = client.fetch(&query()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::NetworkError);
        assert!(err.is_transient());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
