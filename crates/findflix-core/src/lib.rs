use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use findflix_client::{
    cache::{FileStore, KeyValueStore, MemoryStore, ResultCache, DEFAULT_CAPACITY},
    default_cache_dir, ClientConfig, TvMazeClient,
};
use tracing::{debug, info};

pub mod catalog;
pub mod episodes;
pub mod normalize;
pub mod ranking;
pub mod session;
pub mod similarity;

use catalog::{Catalog, CatalogConfig};
use ranking::Ranker;
use session::{QuerySession, Render, DEFAULT_DEBOUNCE};

pub const SEARCH_CACHE_FILE: &str = "search-cache.json";
pub const TOP_SHOWS_FILE: &str = "top-shows.json";

/// Everything needed to wire a session to the real provider.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Overrides the platform cache directory.
    pub cache_dir: Option<PathBuf>,
    pub cache_capacity: usize,
    pub debounce: Duration,
    pub ranker: Ranker,
    pub catalog: CatalogConfig,
    pub client: ClientConfig,
    /// When false, caches live only for the lifetime of the process.
    pub persist: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            cache_capacity: DEFAULT_CAPACITY,
            debounce: DEFAULT_DEBOUNCE,
            ranker: Ranker::default(),
            catalog: CatalogConfig::default(),
            client: ClientConfig::default(),
            persist: true,
        }
    }
}

impl CoreConfig {
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }
}

#[derive(Clone)]
pub struct CoreRuntime {
    config: CoreConfig,
    cache_dir: PathBuf,
    client: Arc<TvMazeClient>,
    session: QuerySession,
}

impl CoreRuntime {
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    pub fn client(&self) -> &TvMazeClient {
        &self.client
    }

    pub fn session(&self) -> &QuerySession {
        &self.session
    }

    /// Empties the result cache, the stored listing and the response cache.
    pub async fn clear_caches(&self) {
        self.session.cache().clear().await;
        self.session.catalog().clear().await;
        self.client.clear_memory_cache();
    }
}

pub async fn bootstrap(config: CoreConfig, renderer: Arc<dyn Render>) -> Result<CoreRuntime> {
    let cache_dir = config.resolved_cache_dir();
    let client = Arc::new(
        TvMazeClient::with_config(config.client.clone()).context("failed to create TVmaze client")?,
    );

    let (search_store, listing_store): (Arc<dyn KeyValueStore>, Arc<dyn KeyValueStore>) =
        if config.persist {
            (
                Arc::new(FileStore::new(cache_dir.join(SEARCH_CACHE_FILE))),
                Arc::new(FileStore::new(cache_dir.join(TOP_SHOWS_FILE))),
            )
        } else {
            (Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
        };

    let cache = ResultCache::hydrate(search_store, config.cache_capacity).await;
    debug!(
        target: "findflix_core",
        cache_dir = %cache_dir.display(),
        entries = cache.len().await,
        "result cache hydrated"
    );

    let session = QuerySession::builder(client.clone(), renderer)
        .cache(cache)
        .catalog(Catalog::new(listing_store, config.catalog))
        .ranker(config.ranker)
        .debounce(config.debounce)
        .build();

    info!(
        target: "findflix_core",
        cache_dir = %cache_dir.display(),
        persist = config.persist,
        debounce_ms = config.debounce.as_millis() as u64,
        "FindFlix session ready"
    );

    Ok(CoreRuntime {
        config,
        cache_dir,
        client,
        session,
    })
}

pub use session::{CommitStatus, Phase, SearchOutcome, Suggestion};

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::CatalogOutcome;
    use tempfile::tempdir;

    struct Silent;

    impl Render for Silent {
        fn show_suggestions(&self, _items: &[Suggestion]) {}
        fn show_result(&self, _outcome: &SearchOutcome) {}
        fn show_catalog(&self, _outcome: &CatalogOutcome) {}
        fn set_loading(&self, _loading: bool) {}
    }

    #[tokio::test]
    async fn bootstrap_hydrates_persisted_search_cache() {
        let tmp = tempdir().expect("tempdir");
        std::fs::write(
            tmp.path().join(SEARCH_CACHE_FILE),
            r#"{"breaking bad": {"id": 169, "name": "Breaking Bad"}}"#,
        )
        .expect("seed cache");

        let config = CoreConfig {
            cache_dir: Some(tmp.path().to_path_buf()),
            ..CoreConfig::default()
        };
        let runtime = bootstrap(config, Arc::new(Silent)).await.expect("bootstrap succeeds");

        assert_eq!(runtime.cache_dir(), &tmp.path().to_path_buf());
        let cached = runtime.session().cache().get("breaking bad").await;
        assert_eq!(cached.map(|show| show.id), Some(169));
    }

    #[tokio::test]
    async fn memory_only_runtime_leaves_disk_untouched() {
        let tmp = tempdir().expect("tempdir");
        let config = CoreConfig {
            cache_dir: Some(tmp.path().to_path_buf()),
            persist: false,
            ..CoreConfig::default()
        };
        let runtime = bootstrap(config, Arc::new(Silent)).await.expect("bootstrap succeeds");
        runtime.clear_caches().await;

        assert!(!tmp.path().join(SEARCH_CACHE_FILE).exists());
        assert!(runtime.session().cache().is_empty().await);
    }

    #[tokio::test]
    async fn runtime_client_carries_configured_provider() {
        let tmp = tempdir().expect("tempdir");
        let mut config = CoreConfig {
            cache_dir: Some(tmp.path().to_path_buf()),
            persist: false,
            ..CoreConfig::default()
        };
        config.client.base_url = "http://127.0.0.1:9/".to_string();
        let runtime = bootstrap(config, Arc::new(Silent)).await.expect("bootstrap succeeds");

        assert_eq!(runtime.client().config().base_url, "http://127.0.0.1:9/");
        assert_eq!(runtime.client().config().timeout, runtime.config().client.timeout);
    }
}
