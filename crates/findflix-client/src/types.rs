use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageLinks {
    #[serde(default)]
    pub medium: Option<String>,
    #[serde(default)]
    pub original: Option<String>,
}

impl ImageLinks {
    /// Preferred thumbnail URL, falling back to the full-size image.
    pub fn best(&self) -> Option<&str> {
        self.medium.as_deref().or(self.original.as_deref())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    #[serde(default)]
    pub average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: u64,
    pub season: u32,
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: Option<ImageLinks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airdate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<u32>,
}

impl Episode {
    /// `S{season}E{number}` label; specials without a number only carry the season.
    pub fn label(&self) -> String {
        match self.number {
            Some(number) => format!("S{}E{}", self.season, number),
            None => format!("S{}", self.season),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedEpisodes {
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Show {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub rating: Rating,
    #[serde(default)]
    pub image: Option<ImageLinks>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premiered: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, rename = "_embedded", skip_serializing_if = "Option::is_none")]
    pub embedded: Option<EmbeddedEpisodes>,
}

impl Show {
    pub fn episodes(&self) -> &[Episode] {
        self.embedded
            .as_ref()
            .map_or(&[], |embedded| embedded.episodes.as_slice())
    }

    pub fn has_image(&self) -> bool {
        self.image.as_ref().and_then(ImageLinks::best).is_some()
    }

    pub fn rating_or_zero(&self) -> f64 {
        self.rating.average.unwrap_or(0.0)
    }

    /// Year part of the premiere date, when the provider knows it.
    pub fn premiere_year(&self) -> Option<&str> {
        self.premiered
            .as_deref()
            .and_then(|date| date.split('-').next())
            .filter(|year| !year.is_empty())
    }
}

/// One row of a `/search/shows` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowMatch {
    #[serde(default)]
    pub score: Option<f64>,
    pub show: Show,
}

/// Episode reduced to what the default listing needs to keep on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEpisode {
    pub id: u64,
    pub season: u32,
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: Option<ImageLinks>,
}

impl From<&Episode> for CatalogEpisode {
    fn from(episode: &Episode) -> Self {
        Self {
            id: episode.id,
            season: episode.season,
            number: episode.number,
            name: episode.name.clone(),
            image: episode.image.clone(),
        }
    }
}

impl From<CatalogEpisode> for Episode {
    fn from(episode: CatalogEpisode) -> Self {
        Self {
            id: episode.id,
            season: episode.season,
            number: episode.number,
            name: episode.name,
            image: episode.image,
            airdate: None,
            runtime: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogShow {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub image: Option<ImageLinks>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub episodes: Vec<CatalogEpisode>,
}

impl From<&Show> for CatalogShow {
    fn from(show: &Show) -> Self {
        Self {
            id: show.id,
            name: show.name.clone(),
            image: show.image.clone(),
            rating: show.rating.average,
            episodes: show.episodes().iter().map(CatalogEpisode::from).collect(),
        }
    }
}

/// Timestamped wrapper for values written to a durable store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at: OffsetDateTime,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            stored_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn is_fresh(&self, max_age: time::Duration) -> bool {
        OffsetDateTime::now_utc() - self.stored_at <= max_age
    }
}
