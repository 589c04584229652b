//! Text features shared by the analytics heuristics.

use std::collections::{BTreeMap, HashSet};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WORD: Option<Regex> = Regex::new(r"[\p{L}\p{N}][\p{L}\p{N}'\-]*").ok();
    static ref STOPWORDS: HashSet<&'static str> = [
        "a", "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be",
        "because", "been", "before", "being", "but", "by", "can", "could", "did", "do", "does",
        "doing", "don't", "for", "from", "further", "had", "has", "have", "having", "he", "her",
        "here", "hers", "him", "his", "how", "i", "i'm", "if", "in", "into", "is", "it", "it's",
        "its", "just", "let's", "like", "more", "most", "much", "my", "no", "not", "now", "of",
        "on", "once", "one", "only", "or", "other", "our", "out", "over", "own", "really", "same",
        "she", "should", "so", "some", "such", "than", "that", "that's", "the", "their", "them",
        "then", "there", "these", "they", "think", "this", "those", "through", "to", "too",
        "under", "up", "very", "was", "way", "we", "we're", "were", "what", "when", "where",
        "which", "while", "who", "why", "will", "with", "would", "yes", "you", "your",
    ]
    .into_iter()
    .collect();
}

/// Words that signal agreement with a previous speaker.
pub const AGREEMENT_MARKERS: &[&str] = &[
    "agree", "exactly", "absolutely", "right", "indeed", "yes", "true", "fair", "building",
];

/// Words that signal disagreement with a previous speaker.
pub const DISAGREEMENT_MARKERS: &[&str] = &[
    "disagree", "however", "but", "not", "doubt", "unconvinced", "wrong", "although", "skeptical",
];

/// Lowercased word tokens.
pub fn words(text: &str) -> Vec<String> {
    match WORD.as_ref() {
        Some(re) => re.find_iter(text).map(|m| m.as_str().to_lowercase()).collect(),
        None => Vec::new(),
    }
}

/// Word tokens with stopwords and very short words removed.
pub fn keywords(text: &str) -> Vec<String> {
    words(text)
        .into_iter()
        .filter(|w| w.chars().count() > 2 && !STOPWORDS.contains(w.as_str()))
        .collect()
}

/// The `limit` most frequent keywords across `texts`.
///
/// Ties break alphabetically so the result is deterministic.
pub fn top_keywords<'a>(texts: impl IntoIterator<Item = &'a str>, limit: usize) -> Vec<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for text in texts {
        for word in keywords(text) {
            *counts.entry(word).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(w, _)| w).collect()
}

/// Count of words in `text` that appear in `markers`.
pub fn marker_hits(text: &str, markers: &[&str]) -> usize {
    words(text)
        .iter()
        .filter(|w| markers.contains(&w.as_str()))
        .count()
}

/// Clamp a score into `[0, 100]`, rounded to one decimal.
pub fn percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    (value.clamp(0.0, 100.0) * 10.0).round() / 10.0
}
