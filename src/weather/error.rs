use crate::error::FailureKind;
use crate::weather::payload::PayloadFormat;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Connect failure, timeout or a broken body stream. The source never carries the
    /// request URL, since that would include the service key.
    #[error("Network request failed for {endpoint}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP request failed for {endpoint} with status {status}")]
    HttpStatus {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    #[error("Failed to parse {format} weather payload: {message}")]
    Parse {
        format: PayloadFormat,
        message: String,
    },

    #[error("Weather payload contained no forecast items")]
    EmptyPayload,
}

impl FetchError {
    pub(crate) fn network(endpoint: &str, source: reqwest::Error) -> Self {
        FetchError::Network {
            endpoint: endpoint.to_string(),
            source: source.without_url(),
        }
    }

    pub(crate) fn parse(format: PayloadFormat, message: impl Into<String>) -> Self {
        FetchError::Parse {
            format,
            message: message.into(),
        }
    }

    /// The taxonomy entry reported in fallback explanations. Non-2xx responses keep
    /// their status code.
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Network { .. } => FailureKind::NetworkError,
            FetchError::HttpStatus { status, .. } => FailureKind::HttpError(status.as_u16()),
            FetchError::Parse { .. } => FailureKind::ParseError,
            FetchError::EmptyPayload => FailureKind::EmptyPayload,
        }
    }

    /// Network failures and server-side (5xx) statuses may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { .. } => true,
            FetchError::HttpStatus { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("TLS configuration rejected by rustls")]
    Tls(#[source] rustls::Error),

    #[error("Failed to build HTTP client")]
    Client(#[source] reqwest::Error),
}
