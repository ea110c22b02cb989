//! HTTP layer for certificate retrieval: timeout, status mapping, size cap.
//!
//! This is the only place that talks to the network. Origin validation has
//! already happened by the time a fetcher is called.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::error::{VerifyError, VerifyResult};

/// User agent sent with certificate requests.
pub const FETCH_USER_AGENT: &str = concat!("sns-verify/", env!("CARGO_PKG_VERSION"));

/// Signing certificates are a few KiB; anything larger is not a certificate.
pub const MAX_CERT_BYTES: usize = 64 * 1024;

/// Source of raw certificate bytes.
#[async_trait]
pub trait CertificateFetcher: Send + Sync + std::fmt::Debug {
    /// Retrieve the certificate body at `url`.
    async fn fetch(&self, url: &str) -> VerifyResult<Vec<u8>>;
}

/// reqwest-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    ///
    /// Redirects are not followed: the origin check only vouches for the URL
    /// as given, so a 3xx is reported as a fetch failure.
    pub fn new(timeout: Duration) -> VerifyResult<Self> {
        if timeout.is_zero() {
            return Err(VerifyError::Config {
                message: "certificate fetch timeout must be greater than zero".to_string(),
            });
        }

        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(FETCH_USER_AGENT));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .default_headers(default_headers)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| VerifyError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    /// Wrap an existing client (shared connection pool, custom TLS roots).
    ///
    /// The client should be built with `redirect::Policy::none()`; a client
    /// that follows redirects can fetch from hosts the origin check never saw.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CertificateFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> VerifyResult<Vec<u8>> {
        debug!(url = %url, "fetching signing certificate");

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(VerifyError::Fetch {
                url: url.to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        if let Some(len) = response.content_length() {
            if len > MAX_CERT_BYTES as u64 {
                return Err(VerifyError::Fetch {
                    url: url.to_string(),
                    message: format!("certificate too large: {} bytes", len),
                });
            }
        }

        let body = response.bytes().await.map_err(|e| VerifyError::Fetch {
            url: url.to_string(),
            message: format!("failed to read response body: {}", e),
        })?;

        if body.len() > MAX_CERT_BYTES {
            return Err(VerifyError::Fetch {
                url: url.to_string(),
                message: format!("certificate too large: {} bytes", body.len()),
            });
        }

        Ok(body.to_vec())
    }
}
