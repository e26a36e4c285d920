use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use crate::config::FetchConfig;

/// Raw result of retrieving a page, before any parsing.
#[derive(Debug, Clone, Default)]
pub struct FetchedResponse {
    /// URL the final (non-redirect) response came from.
    pub final_url: String,
    pub status: u16,
    /// URLs that answered with a redirect, in the order they were visited.
    pub history: Vec<String>,
    pub headers: Vec<(String, String)>,
    /// Response body, truncated to the configured byte budget.
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url '{0}'")]
    InvalidUrl(String),
    #[error("fetching {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("more than {0} redirects")]
    TooManyRedirects(usize),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Retrieves a document for feature extraction. One bounded attempt per call.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedResponse, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
    max_redirects: usize,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Use a prepared client. It must not follow redirects itself, or the
    /// recorded history stays empty.
    pub fn with_client(client: Client, config: &FetchConfig) -> Self {
        Self {
            client,
            max_redirects: config.max_redirects,
            max_body_bytes: config.max_body_bytes,
        }
    }

    async fn fetch_following_redirects(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let mut current =
            Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        let mut history = Vec::new();

        loop {
            let mut response = self
                .client
                .get(current.clone())
                .send()
                .await?;
            let status = response.status();

            if status.is_redirection() {
                let next = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|location| location.to_str().ok())
                    .and_then(|location| current.join(location).ok());

                if let Some(next) = next {
                    if history.len() >= self.max_redirects {
                        return Err(FetchError::TooManyRedirects(self.max_redirects));
                    }
                    log::debug!("Following redirect {}: {} -> {}", history.len() + 1, current, next);
                    history.push(current.to_string());
                    current = next;
                    continue;
                }
            }

            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).to_string(),
                    )
                })
                .collect();

            let mut raw = Vec::new();
            while let Some(chunk) = response.chunk().await? {
                let remaining = self.max_body_bytes.saturating_sub(raw.len());
                raw.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
                if raw.len() >= self.max_body_bytes {
                    break;
                }
            }

            return Ok(FetchedResponse {
                final_url: current.to_string(),
                status: status.as_u16(),
                history,
                headers,
                body: String::from_utf8_lossy(&raw).to_string(),
            });
        }
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedResponse, FetchError> {
        // one deadline for the whole chain, redirects and body included
        match tokio::time::timeout(timeout, self.fetch_following_redirects(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout,
            }),
        }
    }
}

/// Fetcher that never reaches the network; every call fails.
///
/// Used when extraction should run on the address alone.
pub struct OfflineFetcher;

#[async_trait]
impl DocumentFetcher for OfflineFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<FetchedResponse, FetchError> {
        Err(FetchError::InvalidUrl(format!("offline mode: {url}")))
    }
}
