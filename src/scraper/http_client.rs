use crate::config::ScraperConfig;
use crate::error::TransportError;
use anyhow::{Context, Result};
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

pub struct HttpClient {
    inner: reqwest::Client,
    jitter_ms: u64,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .context("Invalid Accept-Language header")?,
        );

        // No cookie store: every request is anonymous.
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            jitter_ms: config.jitter_ms,
        })
    }

    /// Fetch a URL as text. One attempt; the scheduler owns retry policy.
    pub async fn get_text(&self, url: Url) -> Result<String, TransportError> {
        self.polite_delay().await;

        let url_str = url.to_string();
        debug!("GET {}", url_str);

        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|source| TransportError::Request { url: url_str.clone(), source })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url_str,
                status: status.as_u16(),
            });
        }

        resp.text()
            .await
            .map_err(|source| TransportError::Request { url: url_str, source })
    }

    /// Sleep for a random jitter so requests don't land on a fixed beat.
    async fn polite_delay(&self) {
        if self.jitter_ms == 0 {
            return;
        }
        let jitter = rand::random::<u64>() % (self.jitter_ms + 1);
        sleep(Duration::from_millis(jitter)).await;
    }
}
