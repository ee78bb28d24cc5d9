//! Composite ranking of remote candidates against a query.

use std::cmp::Ordering;

use findflix_client::types::ShowMatch;
use serde::{Deserialize, Serialize};

use crate::{
    normalize::normalize,
    similarity::{prefix_normalized, similarity_normalized, subsequence_normalized},
};

/// A remote show eligible for matching. Absent numbers rank as zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub id: u64,
    pub name: String,
    pub relevance: Option<f64>,
    pub popularity: Option<f64>,
    pub rating: Option<f64>,
}

impl Candidate {
    pub fn relevance(&self) -> f64 {
        self.relevance.unwrap_or(0.0)
    }

    pub fn popularity(&self) -> f64 {
        self.popularity.unwrap_or(0.0)
    }

    pub fn rating(&self) -> f64 {
        self.rating.unwrap_or(0.0)
    }
}

impl From<&ShowMatch> for Candidate {
    fn from(row: &ShowMatch) -> Self {
        Self {
            id: row.show.id,
            name: row.show.name.clone(),
            relevance: row.score,
            popularity: row.show.weight,
            rating: row.show.rating.average,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreComponents {
    pub prefix: f64,
    pub subsequence: f64,
    pub similarity: f64,
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
    pub components: ScoreComponents,
}

/// Weights of the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub prefix: f64,
    pub subsequence: f64,
    pub similarity: f64,
    pub relevance: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            prefix: 0.5,
            subsequence: 0.2,
            similarity: 0.25,
            relevance: 0.05,
        }
    }
}

/// Which candidates make it into the suggestion list. Any single signal
/// clearing its bar keeps a candidate, whatever its composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionPolicy {
    pub min_score: f64,
    pub min_subsequence: f64,
    pub min_similarity: f64,
    /// Below this many survivors the list is backfilled by popularity.
    pub min_results: usize,
    pub max_results: usize,
}

impl Default for SuggestionPolicy {
    fn default() -> Self {
        Self {
            min_score: 0.2,
            min_subsequence: 0.5,
            min_similarity: 0.5,
            min_results: 4,
            max_results: 4,
        }
    }
}

/// Acceptance rule for the single best match of a committed search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceptancePolicy {
    pub similarity_weight: f64,
    pub relevance_weight: f64,
    /// A best match is rejected only when it misses both bars.
    pub min_similarity: f64,
    pub min_combined: f64,
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        Self {
            similarity_weight: 0.75,
            relevance_weight: 0.25,
            min_similarity: 0.45,
            min_combined: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestMatch {
    pub scored: ScoredCandidate,
    pub combined: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ranker {
    pub weights: RankingWeights,
    pub suggestions: SuggestionPolicy,
    pub acceptance: AcceptancePolicy,
}

impl Ranker {
    pub fn score(&self, query: &str, candidate: &Candidate) -> ScoredCandidate {
        self.score_normalized(&normalize(query), candidate)
    }

    fn score_normalized(&self, query: &str, candidate: &Candidate) -> ScoredCandidate {
        let title = normalize(&candidate.name);
        let components = ScoreComponents {
            prefix: prefix_normalized(query, &title),
            subsequence: subsequence_normalized(query, &title),
            similarity: similarity_normalized(query, &title),
            relevance: candidate.relevance(),
        };
        let weights = &self.weights;
        let score = weights.prefix * components.prefix
            + weights.subsequence * components.subsequence
            + weights.similarity * components.similarity
            + weights.relevance * components.relevance;
        ScoredCandidate {
            candidate: candidate.clone(),
            score,
            components,
        }
    }

    /// Ranked suggestion list for a partially typed query.
    pub fn suggestions(&self, query: &str, candidates: &[Candidate]) -> Vec<ScoredCandidate> {
        let policy = &self.suggestions;
        let query = normalize(query);
        let (mut kept, rest): (Vec<_>, Vec<_>) = candidates
            .iter()
            .map(|candidate| self.score_normalized(&query, candidate))
            .partition(|scored| self.keeps(scored));
        kept.sort_by(popularity_order);

        if kept.len() < policy.min_results {
            let mut backfill: Vec<_> = rest
                .into_iter()
                .filter(|scored| {
                    scored.components.similarity > 0.0 || scored.components.subsequence > 0.0
                })
                .collect();
            backfill.sort_by(popularity_order);
            let room = policy.max_results.saturating_sub(kept.len());
            kept.extend(backfill.into_iter().take(room));
        }

        kept.truncate(policy.max_results);
        kept
    }

    fn keeps(&self, scored: &ScoredCandidate) -> bool {
        let policy = &self.suggestions;
        let parts = &scored.components;
        scored.score >= policy.min_score
            || parts.prefix > 0.0
            || parts.subsequence >= policy.min_subsequence
            || parts.similarity >= policy.min_similarity
    }

    /// The single candidate a committed search resolves to, or `None` when
    /// even the best one is too weak a textual match.
    pub fn pick_best(&self, query: &str, candidates: &[Candidate]) -> Option<BestMatch> {
        let policy = &self.acceptance;
        let query = normalize(query);

        let mut best: Option<BestMatch> = None;
        for candidate in candidates {
            let scored = self.score_normalized(&query, candidate);
            let combined = policy.similarity_weight * scored.components.similarity
                + policy.relevance_weight * scored.components.relevance;
            if best.as_ref().map_or(true, |current| combined > current.combined) {
                best = Some(BestMatch { scored, combined });
            }
        }

        best.filter(|best| {
            best.scored.components.similarity >= policy.min_similarity
                || best.combined >= policy.min_combined
        })
    }
}

/// Most popular first; ties broken by composite score, rating, then the
/// provider's relevance, all descending.
pub fn popularity_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    let desc = |left: f64, right: f64| right.partial_cmp(&left).unwrap_or(Ordering::Equal);
    desc(a.candidate.popularity(), b.candidate.popularity())
        .then_with(|| desc(a.score, b.score))
        .then_with(|| desc(a.candidate.rating(), b.candidate.rating()))
        .then_with(|| desc(a.candidate.relevance(), b.candidate.relevance()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u64, name: &str, relevance: f64, popularity: f64) -> Candidate {
        Candidate {
            id,
            name: name.to_string(),
            relevance: Some(relevance),
            popularity: Some(popularity),
            rating: None,
        }
    }

    #[test]
    fn exact_title_scores_near_one() {
        let scored = Ranker::default().score("breaking bad", &candidate(1, "Breaking Bad", 0.9, 99.0));
        assert_eq!(scored.components.prefix, 1.0);
        assert_eq!(scored.components.similarity, 1.0);
        assert_eq!(scored.components.subsequence, 1.0);
        assert!((scored.score - (0.95 + 0.05 * 0.9)).abs() < 1e-9);
    }

    #[test]
    fn exact_title_is_accepted_as_best() {
        let candidates = vec![
            candidate(1, "Breaking Bad", 0.9, 99.0),
            candidate(2, "Breaking Point", 0.5, 10.0),
        ];
        let best = Ranker::default()
            .pick_best("breaking bad", &candidates)
            .expect("accepted");
        assert_eq!(best.scored.candidate.id, 1);
        assert!(best.combined >= 0.5);
    }

    #[test]
    fn garbled_query_is_rejected() {
        let candidates = vec![candidate(1, "The Sopranos", 0.3, 95.0)];
        let ranker = Ranker::default();
        let scored = ranker.score("thes00prans0", &candidates[0]);
        assert!(scored.components.similarity < 0.45);
        assert!(ranker.pick_best("thes00prans0", &candidates).is_none());
    }

    #[test]
    fn strong_textual_match_passes_with_low_relevance() {
        let candidates = vec![candidate(1, "Sopranos", 0.0, 1.0)];
        assert!(Ranker::default().pick_best("sopranoss", &candidates).is_some());
    }

    #[test]
    fn boosted_relevance_alone_cannot_rescue_a_weak_match() {
        // similarity 0, combined 0.25 * 1.2 = 0.3
        let candidates = vec![candidate(1, "abcd", 1.2, 1.0)];
        assert!(Ranker::default().pick_best("wxyz", &candidates).is_none());
        // similarity 0.5 clears its own bar
        assert!(Ranker::default().pick_best("abxy", &candidates).is_some());
    }

    #[test]
    fn empty_candidate_list_has_no_best() {
        assert!(Ranker::default().pick_best("anything", &[]).is_none());
    }

    #[test]
    fn suggestions_sorted_by_popularity_then_score() {
        let candidates = vec![
            candidate(1, "Breaking Bad", 0.9, 50.0),
            candidate(2, "Breakout Kings", 0.5, 90.0),
            candidate(3, "Break Point", 0.4, 90.0),
        ];
        let ids: Vec<u64> = Ranker::default()
            .suggestions("break", &candidates)
            .iter()
            .map(|scored| scored.candidate.id)
            .collect();
        // 2 and 3 tie on popularity; "Break Point" covers more of its title.
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn single_strong_signal_keeps_a_candidate() {
        let ranker = Ranker {
            suggestions: SuggestionPolicy {
                min_results: 0,
                ..SuggestionPolicy::default()
            },
            ..Ranker::default()
        };
        let candidates = vec![
            candidate(1, "Zzzz Qqqq Wwww Breaking", 0.0, 1.0),
            candidate(2, "Unrelated", 0.0, 1.0),
        ];
        let kept = ranker.suggestions("zqw", &candidates);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].candidate.id, 1);
    }

    #[test]
    fn backfills_with_popular_partial_matches() {
        let candidates = vec![
            candidate(1, "Westworld", 0.9, 10.0),
            candidate(2, "Shogun", 0.0, 80.0),
            candidate(3, "Xxxxxxxxxxxx", 0.0, 99.0),
            candidate(4, "Sherlock", 0.0, 70.0),
        ];
        let ranked = Ranker::default().suggestions("westworld", &candidates);
        let ids: Vec<u64> = ranked.iter().map(|scored| scored.candidate.id).collect();
        // "Xxxxxxxxxxxx" shares nothing with the query, so it is never shown.
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[test]
    fn suggestions_are_capped() {
        let candidates: Vec<_> = (0..10)
            .map(|id| candidate(id, &format!("Lost {id}"), 0.5, id as f64))
            .collect();
        let ranked = Ranker::default().suggestions("lost", &candidates);
        assert_eq!(ranked.len(), 4);
        assert_eq!(ranked[0].candidate.id, 9);
    }

    #[test]
    fn popularity_order_falls_through_to_rating_and_relevance() {
        let ranker = Ranker::default();
        let mut a = ranker.score("x", &candidate(1, "Same", 0.1, 5.0));
        let mut b = ranker.score("x", &candidate(2, "Same", 0.1, 5.0));
        a.candidate.rating = Some(7.0);
        b.candidate.rating = Some(8.0);
        assert_eq!(popularity_order(&a, &b), Ordering::Greater);

        b.candidate.rating = Some(7.0);
        b.candidate.relevance = Some(0.2);
        assert_eq!(popularity_order(&a, &b), Ordering::Greater);
    }

    #[test]
    fn policies_deserialize_with_defaults_for_missing_fields() {
        let ranker: Ranker =
            serde_json::from_str(r#"{"weights": {"prefix": 0.6}, "acceptance": {"min_combined": 0.4}}"#)
                .unwrap();
        assert_eq!(ranker.weights.prefix, 0.6);
        assert_eq!(ranker.weights.similarity, 0.25);
        assert_eq!(ranker.acceptance.min_combined, 0.4);
        assert_eq!(ranker.suggestions, SuggestionPolicy::default());
    }
}
