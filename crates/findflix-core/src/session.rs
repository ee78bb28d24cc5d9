//! Query session: debounced committed searches, suggest-while-typing and the
//! empty-input fallback listing.
//!
//! Every committed search takes a fresh request token. A response is only
//! rendered if its token is still the newest one when it arrives; older
//! responses run to completion and are dropped.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use findflix_client::{
    cache::{MemoryStore, ResultCache, DEFAULT_CAPACITY},
    types::{ImageLinks, Show, ShowMatch},
    ClientError, ShowProvider,
};
use serde::Serialize;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, warn};

use crate::{
    catalog::{Catalog, CatalogConfig, CatalogOutcome},
    normalize::normalize,
    ranking::{Candidate, Ranker, ScoreComponents},
};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(450);

/// UI collaborator receiving everything the session produces.
pub trait Render: Send + Sync {
    fn show_suggestions(&self, items: &[Suggestion]);
    fn show_result(&self, outcome: &SearchOutcome);
    fn show_catalog(&self, outcome: &CatalogOutcome);
    fn set_loading(&self, loading: bool);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub id: u64,
    pub name: String,
    pub score: f64,
    pub components: ScoreComponents,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub premiere_year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    Found { query: String, show: Show },
    NotFound { query: String },
    NetworkFailure { query: String, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitStatus {
    Applied(SearchOutcome),
    /// A newer search was issued before this one finished.
    Superseded,
    /// Blank query, nothing dispatched.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Pending,
    InFlight,
}

struct Inner {
    provider: Arc<dyn ShowProvider>,
    renderer: Arc<dyn Render>,
    cache: ResultCache<Show>,
    catalog: Catalog,
    ranker: Ranker,
    debounce: Duration,
    current_token: AtomicU64,
    in_flight: AtomicU64,
    suggestion_seq: AtomicU64,
    debounce_seq: AtomicU64,
    pending: Mutex<Option<Armed>>,
    tasks: TaskTracker,
}

/// The single debounced search waiting for its quiet period.
struct Armed {
    generation: u64,
    cancel: CancellationToken,
}

impl Inner {
    fn issue_token(&self) -> u64 {
        self.current_token.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, token: u64) -> bool {
        self.current_token.load(Ordering::SeqCst) == token
    }

    fn pending_slot(&self) -> MutexGuard<'_, Option<Armed>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shows the loading indicator for as long as the owning request is the
/// newest one, and hides it on every exit path of that request.
struct LoadingGuard<'a> {
    inner: &'a Inner,
    token: u64,
}

impl<'a> LoadingGuard<'a> {
    fn acquire(inner: &'a Inner, token: u64) -> Self {
        inner.renderer.set_loading(true);
        Self { inner, token }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.inner.is_current(self.token) {
            self.inner.renderer.set_loading(false);
        }
    }
}

pub struct QuerySessionBuilder {
    provider: Arc<dyn ShowProvider>,
    renderer: Arc<dyn Render>,
    cache: Option<ResultCache<Show>>,
    catalog: Option<Catalog>,
    ranker: Ranker,
    debounce: Duration,
}

impl QuerySessionBuilder {
    pub fn new(provider: Arc<dyn ShowProvider>, renderer: Arc<dyn Render>) -> Self {
        Self {
            provider,
            renderer,
            cache: None,
            catalog: None,
            ranker: Ranker::default(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    #[must_use]
    pub fn cache(mut self, cache: ResultCache<Show>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    #[must_use]
    pub fn ranker(mut self, ranker: Ranker) -> Self {
        self.ranker = ranker;
        self
    }

    #[must_use]
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn build(self) -> QuerySession {
        let cache = self
            .cache
            .unwrap_or_else(|| ResultCache::empty(Arc::new(MemoryStore::new()), DEFAULT_CAPACITY));
        let catalog = self.catalog.unwrap_or_else(|| {
            Catalog::new(Arc::new(MemoryStore::new()), CatalogConfig::default())
        });
        QuerySession {
            inner: Arc::new(Inner {
                provider: self.provider,
                renderer: self.renderer,
                cache,
                catalog,
                ranker: self.ranker,
                debounce: self.debounce,
                current_token: AtomicU64::new(0),
                in_flight: AtomicU64::new(0),
                suggestion_seq: AtomicU64::new(0),
                debounce_seq: AtomicU64::new(0),
                pending: Mutex::new(None),
                tasks: TaskTracker::new(),
            }),
        }
    }
}

#[derive(Clone)]
pub struct QuerySession {
    inner: Arc<Inner>,
}

impl QuerySession {
    pub fn builder(
        provider: Arc<dyn ShowProvider>,
        renderer: Arc<dyn Render>,
    ) -> QuerySessionBuilder {
        QuerySessionBuilder::new(provider, renderer)
    }

    pub fn cache(&self) -> &ResultCache<Show> {
        &self.inner.cache
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub fn current_token(&self) -> u64 {
        self.inner.current_token.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> Phase {
        if self.inner.pending_slot().is_some() {
            return Phase::Pending;
        }
        let in_flight = self.inner.in_flight.load(Ordering::SeqCst);
        if in_flight != 0 && self.inner.is_current(in_flight) {
            Phase::InFlight
        } else {
            Phase::Idle
        }
    }

    /// Waits until every task spawned by [`Self::on_input`] has finished,
    /// including an armed debounce timer and the search it commits.
    pub async fn settle(&self) {
        let tasks = &self.inner.tasks;
        tasks.close();
        tasks.wait().await;
        tasks.reopen();
    }

    /// Handles one change of the search box. Must run inside a Tokio runtime:
    /// suggestions, the debounced search and the fallback listing are
    /// spawned as tasks.
    pub fn on_input(&self, raw: &str) {
        let query = raw.trim().to_string();
        if query.is_empty() {
            self.cancel_pending();
            self.next_suggestion_seq();
            self.inner.renderer.show_suggestions(&[]);
            let session = self.clone();
            self.inner.tasks.spawn(async move {
                session.load_default_listing().await;
            });
            return;
        }

        let seq = self.next_suggestion_seq();
        let session = self.clone();
        let suggest_query = query.clone();
        self.inner.tasks.spawn(async move {
            session.suggest_as(seq, &suggest_query).await;
        });
        self.arm_debounce(query);
    }

    fn arm_debounce(&self, query: String) {
        let cancel = CancellationToken::new();
        let generation = self.inner.debounce_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let armed = Armed {
            generation,
            cancel: cancel.clone(),
        };
        if let Some(previous) = self.inner.pending_slot().replace(armed) {
            previous.cancel.cancel();
        }

        let session = self.clone();
        let delay = self.inner.debounce;
        self.inner.tasks.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    session.disarm(generation);
                    session.commit_search(&query).await;
                }
            }
        });
    }

    /// Empties the pending slot unless a newer debounce has replaced `generation`.
    fn disarm(&self, generation: u64) {
        let mut slot = self.inner.pending_slot();
        if slot.as_ref().is_some_and(|armed| armed.generation == generation) {
            slot.take();
        }
    }

    /// Drops the armed search and invalidates any search in flight.
    pub fn cancel_pending(&self) {
        if let Some(pending) = self.inner.pending_slot().take() {
            pending.cancel.cancel();
        }
        self.inner.current_token.fetch_add(1, Ordering::SeqCst);
    }

    /// Resolves `raw` to a single show and renders it, unless a newer search
    /// has been issued by the time the answer arrives.
    pub async fn commit_search(&self, raw: &str) -> CommitStatus {
        let query = raw.trim();
        if query.is_empty() {
            return CommitStatus::Skipped;
        }

        let token = self.inner.issue_token();
        self.inner.in_flight.store(token, Ordering::SeqCst);
        let _loading = LoadingGuard::acquire(&self.inner, token);

        let outcome = self.resolve(query).await;
        if !self.inner.is_current(token) {
            debug!(target: "findflix_session", token, query, "discarding superseded response");
            return CommitStatus::Superseded;
        }

        let _ = self
            .inner
            .in_flight
            .compare_exchange(token, 0, Ordering::SeqCst, Ordering::SeqCst);
        self.inner.renderer.show_result(&outcome);
        CommitStatus::Applied(outcome)
    }

    async fn resolve(&self, query: &str) -> SearchOutcome {
        let key = normalize(query);
        if !key.is_empty() {
            if let Some(show) = self.inner.cache.get(&key).await {
                debug!(target: "findflix_session", key, "result served from cache");
                return SearchOutcome::Found {
                    query: query.to_string(),
                    show,
                };
            }
        }

        let rows = match self.inner.provider.search_shows(query).await {
            Ok(rows) => rows,
            Err(error) => return failure(query, &error),
        };
        let candidates: Vec<Candidate> = rows.iter().map(Candidate::from).collect();
        let Some(best) = self.inner.ranker.pick_best(query, &candidates) else {
            debug!(
                target: "findflix_session",
                query,
                candidates = candidates.len(),
                "no candidate cleared the acceptance bar"
            );
            return SearchOutcome::NotFound {
                query: query.to_string(),
            };
        };

        let show = match self
            .inner
            .provider
            .show_with_episodes(best.scored.candidate.id)
            .await
        {
            Ok(show) => show,
            Err(error) => return failure(query, &error),
        };
        if !key.is_empty() {
            self.inner.cache.put(key, show.clone()).await;
        }
        SearchOutcome::Found {
            query: query.to_string(),
            show,
        }
    }

    /// Ranked suggestions for a partial query. Only the newest suggestion
    /// request gets rendered.
    pub async fn suggest(&self, raw: &str) -> Vec<Suggestion> {
        let seq = self.next_suggestion_seq();
        self.suggest_as(seq, raw).await
    }

    fn next_suggestion_seq(&self) -> u64 {
        self.inner.suggestion_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn suggest_as(&self, seq: u64, raw: &str) -> Vec<Suggestion> {
        let query = raw.trim();

        let items = if query.is_empty() {
            Vec::new()
        } else {
            match self.inner.provider.search_shows(query).await {
                Ok(rows) => self.rank_suggestions(query, &rows),
                Err(error) => {
                    debug!(target: "findflix_session", %error, query, "suggestion lookup failed");
                    Vec::new()
                }
            }
        };

        if self.inner.suggestion_seq.load(Ordering::SeqCst) == seq {
            self.inner.renderer.show_suggestions(&items);
        }
        items
    }

    fn rank_suggestions(&self, query: &str, rows: &[ShowMatch]) -> Vec<Suggestion> {
        let candidates: Vec<Candidate> = rows.iter().map(Candidate::from).collect();
        self.inner
            .ranker
            .suggestions(query, &candidates)
            .into_iter()
            .map(|scored| {
                let show = rows
                    .iter()
                    .map(|row| &row.show)
                    .find(|show| show.id == scored.candidate.id);
                Suggestion {
                    id: scored.candidate.id,
                    name: scored.candidate.name,
                    score: scored.score,
                    components: scored.components,
                    premiere_year: show.and_then(Show::premiere_year).map(str::to_string),
                    image: show
                        .and_then(|show| show.image.as_ref())
                        .and_then(ImageLinks::best)
                        .map(str::to_string),
                }
            })
            .collect()
    }

    /// Default listing for an empty search box. Not rendered if a search was
    /// committed while it loaded.
    pub async fn load_default_listing(&self) -> CatalogOutcome {
        let token = self.inner.current_token.load(Ordering::SeqCst);
        let _loading = LoadingGuard::acquire(&self.inner, token);

        let outcome = self.inner.catalog.load(self.inner.provider.as_ref()).await;
        if self.inner.is_current(token) {
            self.inner.renderer.show_catalog(&outcome);
        } else {
            debug!(target: "findflix_session", "default listing superseded by a search");
        }
        outcome
    }
}

fn failure(query: &str, error: &ClientError) -> SearchOutcome {
    if error.is_not_found() {
        debug!(target: "findflix_session", %error, query, "provider has no match");
        SearchOutcome::NotFound {
            query: query.to_string(),
        }
    } else {
        warn!(target: "findflix_session", %error, query, "search failed");
        SearchOutcome::NetworkFailure {
            query: query.to_string(),
            message: error.to_string(),
        }
    }
}
