pub mod cache;
pub mod types;

use std::{env, path::PathBuf, time::Duration as StdDuration};

use async_trait::async_trait;
use cache::{CacheStatsSnapshot, ResponseCache};
use directories::ProjectDirs;
use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use time::Duration;
use tracing::{debug, instrument, warn};

use crate::types::{Show, ShowMatch};

pub use reqwest::StatusCode;

pub const BASE_URL: &str = "https://api.tvmaze.com";
pub const CACHE_DIR_ENV: &str = "FINDFLIX_CACHE_DIR";

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("unexpected status code: {0}")]
    Status(StatusCode),
    #[error("malformed response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("failed to build HTTP client: {0}")]
    Setup(String),
}

impl ClientError {
    /// Non-success statuses mean the provider has nothing for us; everything
    /// else is a transport or payload problem.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status(_))
    }
}

/// Remote source of shows and episodes.
#[async_trait]
pub trait ShowProvider: Send + Sync {
    /// Free-text show search, with the provider's relevance score per row.
    async fn search_shows(&self, query: &str) -> Result<Vec<ShowMatch>, ClientError>;

    /// Full show record with its episodes embedded.
    async fn show_with_episodes(&self, id: u64) -> Result<Show, ClientError>;

    /// One page of the provider's show index, used for the default listing.
    async fn shows_page(&self, page: u32) -> Result<Vec<Show>, ClientError>;
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: StdDuration,
    pub response_ttl: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            timeout: StdDuration::from_secs(15),
            response_ttl: Duration::minutes(10),
            user_agent: format!("FindFlix/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Directory holding the persisted caches: `$FINDFLIX_CACHE_DIR`, then the
/// platform cache directory, then a folder under the system temp dir.
pub fn default_cache_dir() -> PathBuf {
    if let Some(dir) = env::var_os(CACHE_DIR_ENV).filter(|value| !value.is_empty()) {
        return PathBuf::from(dir);
    }
    ProjectDirs::from("io", "FindFlix", "findflix").map_or_else(
        || env::temp_dir().join("findflix"),
        |dirs| dirs.cache_dir().to_path_buf(),
    )
}

#[derive(Debug)]
pub struct TvMazeClient {
    http: Client,
    responses: ResponseCache<Vec<u8>>,
    config: ClientConfig,
}

impl TvMazeClient {
    pub fn with_config(config: ClientConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .gzip(true)
            .build()
            .map_err(|err| ClientError::Setup(err.to_string()))?;

        Ok(Self {
            http,
            responses: ResponseCache::new(config.response_ttl),
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn clear_memory_cache(&self) {
        self.responses.clear();
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.responses.stats().snapshot()
    }

    async fn fetch_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let base = self.config.base_url.trim_end_matches('/');
        let request = self
            .http
            .get(format!("{base}/{path}"))
            .query(query)
            .build()
            .map_err(|err| ClientError::Http(err.to_string()))?;
        let url = request.url().to_string();

        if let Some(bytes) = self.responses.get(&url) {
            debug!(url, "response served from memory cache");
            return decode(&url, &bytes);
        }

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|err| ClientError::Http(err.to_string()))?;
        if !response.status().is_success() {
            warn!(status = %response.status(), url, "TVmaze request failed");
            return Err(ClientError::Status(response.status()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| ClientError::Http(err.to_string()))?;
        let value = decode(&url, &bytes)?;
        self.responses.insert(url, bytes.to_vec());
        Ok(value)
    }
}

fn decode<T: DeserializeOwned>(url: &str, bytes: &[u8]) -> Result<T, ClientError> {
    serde_json::from_slice(bytes).map_err(|err| ClientError::Decode {
        url: url.to_string(),
        message: err.to_string(),
    })
}

#[async_trait]
impl ShowProvider for TvMazeClient {
    #[instrument(name = "tvmaze_client.search_shows", skip(self))]
    async fn search_shows(&self, query: &str) -> Result<Vec<ShowMatch>, ClientError> {
        self.fetch_json("search/shows", &[("q", query.to_string())])
            .await
    }

    #[instrument(name = "tvmaze_client.show_with_episodes", skip(self))]
    async fn show_with_episodes(&self, id: u64) -> Result<Show, ClientError> {
        self.fetch_json(&format!("shows/{id}"), &[("embed", "episodes".to_string())])
            .await
    }

    #[instrument(name = "tvmaze_client.shows_page", skip(self))]
    async fn shows_page(&self, page: u32) -> Result<Vec<Show>, ClientError> {
        self.fetch_json("shows", &[("page", page.to_string())]).await
    }
}
