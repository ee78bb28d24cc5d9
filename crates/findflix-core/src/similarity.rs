//! Textual similarity signals between a query and a candidate title.
//!
//! The public functions take raw text and normalize both sides. The
//! `*_normalized` variants skip that step for callers that already hold
//! normalized text, such as the ranker scoring many titles against one query.

use crate::normalize::normalize;

/// Unit-cost Levenshtein distance over characters, using two rolling rows.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ac) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, bc) in b.iter().enumerate() {
            let cost = usize::from(ac != bc);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// `1 - distance / longest length`, in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    similarity_normalized(&normalize(a), &normalize(b))
}

/// In-order coverage of the query's characters within the candidate.
pub fn subsequence_score(query: &str, candidate: &str) -> f64 {
    subsequence_normalized(&normalize(query), &normalize(candidate))
}

/// How much of the candidate the query covers when it is a prefix of it.
pub fn prefix_score(query: &str, candidate: &str) -> f64 {
    prefix_normalized(&normalize(query), &normalize(candidate))
}

pub fn similarity_normalized(a: &str, b: &str) -> f64 {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    match (a_len, b_len) {
        (0, 0) => 1.0,
        (0, _) | (_, 0) => 0.0,
        _ => {
            let longest = a_len.max(b_len).max(1);
            1.0 - levenshtein(a, b) as f64 / longest as f64
        }
    }
}

pub fn subsequence_normalized(query: &str, candidate: &str) -> f64 {
    let query_len = query.chars().count();
    if query_len == 0 {
        return 0.0;
    }

    let mut remaining = candidate.chars();
    let mut matched = 0usize;
    for qc in query.chars() {
        // Greedy: take the first later occurrence, never backtrack.
        if remaining.by_ref().any(|cc| cc == qc) {
            matched += 1;
        } else {
            break;
        }
    }
    matched as f64 / query_len as f64
}

pub fn prefix_normalized(query: &str, candidate: &str) -> f64 {
    if query.is_empty() || !candidate.starts_with(query) {
        return 0.0;
    }
    let query_len = query.chars().count() as f64;
    let candidate_len = candidate.chars().count() as f64;
    (query_len / candidate_len).min(1.0)
}
