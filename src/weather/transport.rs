//! TLS negotiation policies for the weather transport.
//!
//! The forecast portal has historically only completed handshakes with older
//! protocol versions and suites than current client defaults allow. Instead of
//! patching a global TLS context, each [`WeatherClient`](crate::WeatherClient) is built from an explicit
//! [`TlsPolicy`] applied to its own `reqwest::ClientBuilder`.

use crate::weather::error::TransportError;
use reqwest::tls::Version;
use reqwest::ClientBuilder;
use rustls::crypto::ring;
use rustls::{ClientConfig, RootCertStore, SupportedCipherSuite, SupportedProtocolVersion};
use serde::Deserialize;
use std::fmt::Debug;
use std::sync::Arc;

static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// Configures a client builder to negotiate a given minimum cipher level.
///
/// Implement this to plug in a different TLS setup, e.g. a private trust store.
pub trait TlsPolicy: Debug + Send + Sync {
    fn apply(&self, builder: ClientBuilder) -> Result<ClientBuilder, TransportError>;
}

/// The TLS implementation a [`SecurityLevel`] runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsBackend {
    Rustls,
    /// The platform library (OpenSSL, SChannel or Secure Transport).
    Native,
}

/// The built-in policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// rustls, TLS 1.3 only, TLS 1.3 suites only.
    Strict,
    /// rustls with its default suites, TLS 1.2 and 1.3.
    Modern,
    /// The platform TLS library with the protocol floor lowered to TLS 1.0, so
    /// CBC suites and RSA key exchange stay negotiable when the platform still
    /// enables them.
    #[default]
    Compatible,
}

impl SecurityLevel {
    pub fn backend(&self) -> TlsBackend {
        match self {
            SecurityLevel::Strict | SecurityLevel::Modern => TlsBackend::Rustls,
            SecurityLevel::Compatible => TlsBackend::Native,
        }
    }

    /// The lowest protocol version this level accepts.
    pub fn min_tls_version(&self) -> Version {
        match self {
            SecurityLevel::Strict => Version::TLS_1_3,
            SecurityLevel::Modern => Version::TLS_1_2,
            SecurityLevel::Compatible => Version::TLS_1_0,
        }
    }

    /// The rustls suites offered, or `None` when the platform library picks them.
    pub fn cipher_suites(&self) -> Option<Vec<SupportedCipherSuite>> {
        match self {
            SecurityLevel::Strict => Some(
                ring::ALL_CIPHER_SUITES
                    .iter()
                    .copied()
                    .filter(|suite| matches!(suite, SupportedCipherSuite::Tls13(_)))
                    .collect(),
            ),
            SecurityLevel::Modern => Some(ring::DEFAULT_CIPHER_SUITES.to_vec()),
            SecurityLevel::Compatible => None,
        }
    }

    /// A TLS 1.3 only rustls configuration with the `webpki-roots` trust anchors.
    fn strict_config() -> Result<ClientConfig, TransportError> {
        let mut provider = ring::default_provider();
        provider.cipher_suites = SecurityLevel::Strict.cipher_suites().unwrap_or_default();

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder_with_provider(Arc::new(provider))
            .with_protocol_versions(TLS13_ONLY)
            .map_err(TransportError::Tls)?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(config)
    }
}

impl TlsPolicy for SecurityLevel {
    fn apply(&self, builder: ClientBuilder) -> Result<ClientBuilder, TransportError> {
        match self {
            SecurityLevel::Strict => Ok(builder.use_preconfigured_tls(Self::strict_config()?)),
            SecurityLevel::Modern => Ok(builder
                .use_rustls_tls()
                .min_tls_version(self.min_tls_version())),
            SecurityLevel::Compatible => Ok(builder
                .use_native_tls()
                .min_tls_version(self.min_tls_version())),
        }
    }
}
