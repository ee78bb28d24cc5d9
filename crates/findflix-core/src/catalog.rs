//! Default "top shows" listing served when the search box is empty.

use std::{cmp::Ordering, sync::Arc};

use findflix_client::{
    cache::KeyValueStore,
    types::{CacheEntry, CatalogShow, Show},
    ClientError, ShowProvider,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Index pages fetched to gather candidates.
    pub pages: u32,
    /// Shows kept in the listing.
    pub size: usize,
    /// Age after which a persisted listing is rebuilt.
    pub max_age_hours: i64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            pages: 5,
            size: 20,
            max_age_hours: 24 * 7,
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("no catalog page could be fetched: {0}")]
    Unreachable(#[source] ClientError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CatalogOutcome {
    Listing { shows: Vec<CatalogShow> },
    Empty,
    NetworkFailure { message: String },
}

#[derive(Debug)]
pub struct Catalog {
    store: Arc<dyn KeyValueStore>,
    config: CatalogConfig,
}

impl Catalog {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CatalogConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Persisted listing if present, then a fresh build from the provider.
    pub async fn load(&self, provider: &dyn ShowProvider) -> CatalogOutcome {
        if let Some(shows) = self.cached().await {
            debug!(target: "findflix_catalog", shows = shows.len(), "listing served from store");
            return CatalogOutcome::Listing { shows };
        }

        match self.fetch(provider).await {
            Ok(shows) if shows.is_empty() => CatalogOutcome::Empty,
            Ok(shows) => {
                self.persist(&shows).await;
                CatalogOutcome::Listing { shows }
            }
            Err(error) => {
                warn!(target: "findflix_catalog", %error, "failed to build default listing");
                CatalogOutcome::NetworkFailure {
                    message: error.to_string(),
                }
            }
        }
    }

    /// A non-empty, well-formed listing younger than the configured age.
    pub async fn cached(&self) -> Option<Vec<CatalogShow>> {
        let blob = match self.store.read_all().await {
            Ok(blob) => blob?,
            Err(error) => {
                warn!(target: "findflix_catalog", %error, "failed to read stored listing");
                return None;
            }
        };
        let entry: CacheEntry<Vec<CatalogShow>> = match serde_json::from_slice(&blob) {
            Ok(entry) => entry,
            Err(error) => {
                debug!(target: "findflix_catalog", %error, "ignoring malformed stored listing");
                return None;
            }
        };
        let max_age = time::Duration::hours(self.config.max_age_hours);
        (!entry.value.is_empty() && entry.is_fresh(max_age)).then_some(entry.value)
    }

    /// Best-rated shows with artwork across the first index pages, each with
    /// its episodes. Individual failures shrink the listing instead of
    /// failing it.
    pub async fn fetch(&self, provider: &dyn ShowProvider) -> Result<Vec<CatalogShow>, CatalogError> {
        let pages = join_all((0..self.config.pages).map(|page| provider.shows_page(page))).await;

        let mut shows: Vec<Show> = Vec::new();
        let mut transport_error = None;
        let mut reachable = false;
        for page in pages {
            match page {
                Ok(rows) => {
                    reachable = true;
                    shows.extend(rows);
                }
                // Past the end of the index the provider answers 404.
                Err(error) if error.is_not_found() => reachable = true,
                Err(error) => {
                    debug!(target: "findflix_catalog", %error, "catalog page failed");
                    transport_error = Some(error);
                }
            }
        }
        if let (false, Some(error)) = (reachable, transport_error) {
            return Err(CatalogError::Unreachable(error));
        }

        shows.retain(Show::has_image);
        shows.sort_by(|a, b| {
            b.rating_or_zero()
                .partial_cmp(&a.rating_or_zero())
                .unwrap_or(Ordering::Equal)
        });
        shows.truncate(self.config.size);

        let detailed = join_all(shows.iter().map(|show| provider.show_with_episodes(show.id))).await;
        Ok(detailed
            .into_iter()
            .filter_map(|result| match result {
                Ok(show) => Some(CatalogShow::from(&show)),
                Err(error) => {
                    debug!(target: "findflix_catalog", %error, "dropping show without details");
                    None
                }
            })
            .collect())
    }

    pub async fn clear(&self) {
        if let Err(error) = self.store.write_all(b"").await {
            warn!(target: "findflix_catalog", %error, "failed to clear stored listing");
        }
    }

    async fn persist(&self, shows: &[CatalogShow]) {
        let entry = CacheEntry::new(shows);
        match serde_json::to_vec(&entry) {
            Ok(blob) => {
                if let Err(error) = self.store.write_all(&blob).await {
                    warn!(target: "findflix_catalog", %error, "failed to persist default listing");
                }
            }
            Err(error) => {
                warn!(target: "findflix_catalog", %error, "failed to serialize default listing");
            }
        }
    }
}
