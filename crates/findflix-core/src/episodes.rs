//! Season filtering and summaries for a resolved show.

use std::collections::BTreeMap;

use findflix_client::types::Episode;
use serde::Serialize;

/// Highest season number present, or 1 for an empty list.
pub fn season_count(episodes: &[Episode]) -> u32 {
    episodes
        .iter()
        .map(|episode| episode.season)
        .max()
        .unwrap_or(1)
}

/// Inclusive season bounds with `min <= max` always holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeasonRange {
    min: u32,
    max: u32,
}

impl SeasonRange {
    /// Seasons start at 1; a max below min is raised to min, the same way
    /// the season pickers keep themselves consistent.
    pub fn new(min: u32, max: u32) -> Self {
        let min = min.max(1);
        Self {
            min,
            max: max.max(min),
        }
    }

    pub fn all(episodes: &[Episode]) -> Self {
        Self::new(1, season_count(episodes))
    }

    /// Missing bounds default to the full span of `episodes`.
    pub fn from_bounds(min: Option<u32>, max: Option<u32>, episodes: &[Episode]) -> Self {
        Self::new(min.unwrap_or(1), max.unwrap_or_else(|| season_count(episodes)))
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn contains(&self, season: u32) -> bool {
        (self.min..=self.max).contains(&season)
    }
}

pub fn filter_episodes(episodes: &[Episode], range: SeasonRange) -> Vec<&Episode> {
    episodes
        .iter()
        .filter(|episode| range.contains(episode.season))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpisodeSummary {
    pub shown: usize,
    pub total: usize,
    pub seasons: u32,
    pub range: SeasonRange,
    pub per_season: BTreeMap<u32, usize>,
}

impl EpisodeSummary {
    pub fn new(episodes: &[Episode], range: SeasonRange) -> Self {
        let mut per_season = BTreeMap::new();
        for episode in episodes {
            *per_season.entry(episode.season).or_insert(0) += 1;
        }
        Self {
            shown: episodes.iter().filter(|e| range.contains(e.season)).count(),
            total: episodes.len(),
            seasons: season_count(episodes),
            range,
            per_season,
        }
    }

    pub fn headline(&self) -> String {
        format!(
            "{}/{} episodes shown (seasons {} → {})",
            self.shown,
            self.total,
            self.range.min(),
            self.range.max()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(id: u64, season: u32) -> Episode {
        Episode {
            id,
            season,
            number: Some(1),
            name: format!("Episode {id}"),
            image: None,
            airdate: None,
            runtime: None,
        }
    }

    #[test]
    fn season_count_defaults_to_one() {
        assert_eq!(season_count(&[]), 1);
        assert_eq!(season_count(&[episode(1, 3), episode(2, 1)]), 3);
    }

    #[test]
    fn range_keeps_min_not_above_max() {
        let range = SeasonRange::new(4, 2);
        assert_eq!((range.min(), range.max()), (4, 4));
        assert_eq!(SeasonRange::new(0, 3).min(), 1);
    }

    #[test]
    fn filters_by_inclusive_range() {
        let episodes = vec![episode(1, 1), episode(2, 2), episode(3, 3), episode(4, 3)];
        let shown = filter_episodes(&episodes, SeasonRange::new(2, 3));
        assert_eq!(shown.iter().map(|e| e.id).collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn missing_bounds_span_every_season() {
        let episodes = vec![episode(1, 1), episode(2, 5)];
        let range = SeasonRange::from_bounds(None, None, &episodes);
        assert_eq!((range.min(), range.max()), (1, 5));
        assert_eq!(SeasonRange::from_bounds(Some(2), None, &episodes).min(), 2);
    }

    #[test]
    fn summary_counts_shown_and_per_season() {
        let episodes = vec![episode(1, 1), episode(2, 1), episode(3, 2)];
        let summary = EpisodeSummary::new(&episodes, SeasonRange::new(2, 2));
        assert_eq!(summary.shown, 1);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.seasons, 2);
        assert_eq!(summary.per_season.get(&1), Some(&2));
        assert_eq!(summary.headline(), "1/3 episodes shown (seasons 2 → 2)");
    }
}
