//! HTTP transport implementation
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building HTTP clients with proper user agent strings
//! - Resolving work-queue keys to request URLs
//! - GET requests to fetch entry pages
//! - Error classification into `TransportError`
//!
//! Retrying is not done here. A failed fetch is reported to the queue, which
//! decides whether the item is claimed again.

use crate::config::{Config, UserAgentConfig};
use crate::crawler::traits::{Transport, TransportError};
use crate::url::is_url_key;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Total timeout for one request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use lexicon_harvester::config::UserAgentConfig;
/// use lexicon_harvester::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "LexiconHarvester".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent_string(config))
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Format: CrawlerName/Version (+ContactURL; ContactEmail)
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// reqwest-backed `Transport`
///
/// URL keys are fetched as-is. Any other key is substituted, percent-encoded,
/// into the `{key}` slot of the configured template.
pub struct HttpTransport {
    client: Client,
    url_template: Option<String>,
}

impl HttpTransport {
    pub fn new(client: Client, url_template: Option<String>) -> Self {
        Self {
            client,
            url_template,
        }
    }

    /// Builds the transport described by the `[user-agent]` and `[transport]`
    /// sections
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(config.transport.timeout_secs);
        let client = build_http_client(&config.user_agent, timeout)?;
        Ok(Self::new(client, config.transport.url_template.clone()))
    }

    /// Resolves the URL a key is fetched from
    pub fn resolve_url(&self, key: &str) -> Result<Url, TransportError> {
        let invalid = |reason: String| TransportError::InvalidKey {
            key: key.to_string(),
            reason,
        };

        if is_url_key(key) {
            return Url::parse(key).map_err(|e| invalid(e.to_string()));
        }

        let template = self
            .url_template
            .as_deref()
            .ok_or_else(|| invalid("not a URL and no url-template configured".to_string()))?;
        let encoded: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();
        Url::parse(&template.replace("{key}", &encoded)).map_err(|e| invalid(e.to_string()))
    }
}

/// Maps a reqwest failure onto the transport taxonomy
fn classify_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else {
        TransportError::Request(error.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, key: &str) -> Result<String, TransportError> {
        let url = self.resolve_url(key)?;
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response.text().await.map_err(classify_error)
    }
}
