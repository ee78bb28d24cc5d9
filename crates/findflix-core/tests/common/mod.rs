#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use findflix_client::{
    types::{EmbeddedEpisodes, Episode, ImageLinks, Rating, Show, ShowMatch},
    ClientError, ShowProvider, StatusCode,
};
use findflix_core::{catalog::CatalogOutcome, session::Render, SearchOutcome, Suggestion};

pub fn show(id: u64, name: &str) -> Show {
    Show {
        id,
        name: name.to_string(),
        weight: Some(50.0),
        rating: Rating::default(),
        image: None,
        genres: Vec::new(),
        premiered: None,
        summary: None,
        embedded: None,
    }
}

pub fn rated_show(id: u64, name: &str, rating: f64, with_image: bool) -> Show {
    Show {
        rating: Rating {
            average: Some(rating),
        },
        image: with_image.then(|| ImageLinks {
            medium: Some(format!("https://img.test/{id}.jpg")),
            original: None,
        }),
        ..show(id, name)
    }
}

pub fn with_episodes(mut show: Show, seasons: u32) -> Show {
    let episodes = (1..=seasons)
        .map(|season| Episode {
            id: u64::from(season),
            season,
            number: Some(1),
            name: format!("Season {season} opener"),
            image: None,
            airdate: None,
            runtime: None,
        })
        .collect();
    show.embedded = Some(EmbeddedEpisodes { episodes });
    show
}

pub fn row(score: f64, show: Show) -> ShowMatch {
    ShowMatch {
        score: Some(score),
        show,
    }
}

/// Scripted provider: canned rows per query, per-query latency and
/// call counters.
#[derive(Default)]
pub struct FakeProvider {
    results: HashMap<String, Vec<ShowMatch>>,
    delays: HashMap<String, Duration>,
    details: HashMap<u64, Show>,
    pages: HashMap<u32, Vec<Show>>,
    offline: bool,
    pub search_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub page_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails the way an unreachable host does.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn with_results(mut self, query: &str, rows: Vec<ShowMatch>) -> Self {
        for row in &rows {
            self.details
                .entry(row.show.id)
                .or_insert_with(|| with_episodes(row.show.clone(), 2));
        }
        self.results.insert(query.to_lowercase(), rows);
        self
    }

    pub fn with_delay(mut self, query: &str, delay: Duration) -> Self {
        self.delays.insert(query.to_lowercase(), delay);
        self
    }

    pub fn with_page(mut self, page: u32, shows: Vec<Show>) -> Self {
        for show in &shows {
            self.details
                .entry(show.id)
                .or_insert_with(|| with_episodes(show.clone(), 3));
        }
        self.pages.insert(page, shows);
        self
    }

    pub fn without_details(mut self, id: u64) -> Self {
        self.details.remove(&id);
        self
    }

    pub fn searches(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn detail_lookups(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    pub fn page_lookups(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShowProvider for FakeProvider {
    async fn search_shows(&self, query: &str) -> Result<Vec<ShowMatch>, ClientError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let key = query.to_lowercase();
        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        if self.offline {
            return Err(ClientError::Http("connection refused".to_string()));
        }
        Ok(self.results.get(&key).cloned().unwrap_or_default())
    }

    async fn show_with_episodes(&self, id: u64) -> Result<Show, ClientError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.offline {
            return Err(ClientError::Http("connection refused".to_string()));
        }
        self.details
            .get(&id)
            .cloned()
            .ok_or(ClientError::Status(StatusCode::NOT_FOUND))
    }

    async fn shows_page(&self, page: u32) -> Result<Vec<Show>, ClientError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if self.offline {
            return Err(ClientError::Http("connection refused".to_string()));
        }
        self.pages
            .get(&page)
            .cloned()
            .ok_or(ClientError::Status(StatusCode::NOT_FOUND))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Suggestions(Vec<String>),
    Result(SearchOutcome),
    Catalog(CatalogOutcome),
    Loading(bool),
}

#[derive(Default)]
pub struct RecordingRenderer {
    events: Mutex<Vec<Event>>,
}

impl RecordingRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("renderer lock").clone()
    }

    pub fn results(&self) -> Vec<SearchOutcome> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Result(outcome) => Some(outcome),
                _ => None,
            })
            .collect()
    }

    pub fn catalogs(&self) -> Vec<CatalogOutcome> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Catalog(outcome) => Some(outcome),
                _ => None,
            })
            .collect()
    }

    pub fn last_suggestions(&self) -> Option<Vec<String>> {
        self.events().into_iter().rev().find_map(|event| match event {
            Event::Suggestions(names) => Some(names),
            _ => None,
        })
    }

    pub fn last_loading(&self) -> Option<bool> {
        self.events().into_iter().rev().find_map(|event| match event {
            Event::Loading(loading) => Some(loading),
            _ => None,
        })
    }

    fn push(&self, event: Event) {
        self.events.lock().expect("renderer lock").push(event);
    }
}

impl Render for RecordingRenderer {
    fn show_suggestions(&self, items: &[Suggestion]) {
        self.push(Event::Suggestions(
            items.iter().map(|item| item.name.clone()).collect(),
        ));
    }

    fn show_result(&self, outcome: &SearchOutcome) {
        self.push(Event::Result(outcome.clone()));
    }

    fn show_catalog(&self, outcome: &CatalogOutcome) {
        self.push(Event::Catalog(outcome.clone()));
    }

    fn set_loading(&self, loading: bool) {
        self.push(Event::Loading(loading));
    }
}
