//! Character-overlap relevance ranking.
//!
//! A query is reduced to its lowercase characters (punctuation and whitespace
//! removed) and every corpus line is scored by how many of those characters it
//! contains. This is deliberately a bag-of-characters heuristic: it works for
//! CJK text where single characters carry meaning, and needs no tokenizer.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Symbols removed from the query before scoring (whitespace is removed too).
const STRIPPED: &[char] = &[
    '.', ',', '/', '#', '!', '$', '%', '^', '&', '*', ';', ':', '{', '}', '=', '-', '_', '`',
    '~', '(', ')', '?',
];

/// How repeated query characters contribute to a line's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Every occurrence in the query scores: "aaa" gives a line containing 'a' three points.
    #[default]
    Occurrences,
    /// Each distinct query character scores at most once.
    Distinct,
}

impl FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "occurrences" => Ok(Self::Occurrences),
            "distinct" => Ok(Self::Distinct),
            other => Err(format!("unknown scoring mode: {other}")),
        }
    }
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Occurrences => f.write_str("occurrences"),
            Self::Distinct => f.write_str("distinct"),
        }
    }
}

/// A corpus line paired with its overlap score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredLine<'a> {
    /// Position of the line in the corpus
    pub index: usize,
    pub text: &'a str,
    pub score: usize,
}

/// Lowercase the query and drop whitespace and the stripped symbols.
/// Duplicates are kept; order does not matter for scoring.
pub fn query_chars(query: &str) -> Vec<char> {
    query
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && !STRIPPED.contains(c))
        .collect()
}

/// Count query characters found anywhere in `line` (case-insensitive).
pub fn score_line(chars: &[char], line: &str, mode: ScoringMode) -> usize {
    let line = line.to_lowercase();
    match mode {
        ScoringMode::Occurrences => chars.iter().filter(|c| line.contains(**c)).count(),
        ScoringMode::Distinct => chars
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter(|c| line.contains(**c))
            .count(),
    }
}

/// Score every line, drop zero scores, and keep the `top_k` best.
///
/// The sort is stable, so equal scores keep corpus order.
pub fn rank_scored<'a, S: AsRef<str>>(
    query: &str,
    lines: &'a [S],
    top_k: usize,
    mode: ScoringMode,
) -> Vec<ScoredLine<'a>> {
    let chars = query_chars(query);
    if chars.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<ScoredLine<'a>> = lines
        .iter()
        .enumerate()
        .filter_map(|(index, line)| {
            let text = line.as_ref();
            let score = score_line(&chars, text, mode);
            (score > 0).then_some(ScoredLine { index, text, score })
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(top_k);
    scored
}

/// The `top_k` most relevant lines in their original casing.
pub fn rank<'a, S: AsRef<str>>(
    query: &str,
    lines: &'a [S],
    top_k: usize,
    mode: ScoringMode,
) -> Vec<&'a str> {
    rank_scored(query, lines, top_k, mode)
        .into_iter()
        .map(|s| s.text)
        .collect()
}
