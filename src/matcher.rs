//! Fuzzy matching of free-form todo text against checkbox titles.
//!
//! Scoring layers four heuristics and takes the best of them rather than a
//! weighted sum:
//!
//! 1. word overlap relative to the shorter word list, with per-word credit
//!    for exact words, prefixes, containment and two-letter abbreviations;
//! 2. a penalty when a single-word query is matched against a target of
//!    three or more words;
//! 3. a bonus when one normalized phrase contains the other;
//! 4. Levenshtein similarity over the full normalized strings as a floor.
//!
//! The thresholds below are contract values; acceptance behavior at the
//! boundary depends on them exactly.

use serde::{Deserialize, Serialize};

/// Minimum score for a match to be accepted.
pub const MATCH_THRESHOLD: f64 = 0.6;

/// Minimum score for a rejected candidate to be offered as a suggestion.
pub const SUGGESTION_THRESHOLD: f64 = 0.4;

/// Score at or above which a match is considered high confidence.
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Multiplier applied to a one-word query against a 3+ word target.
pub const SINGLE_WORD_PENALTY: f64 = 0.4;

/// Bonus for a whole-phrase substring match.
pub const SUBSTRING_BONUS: f64 = 0.1;

const PREFIX_WEIGHT: f64 = 0.9;
const CONTAINED_WEIGHT: f64 = 0.8;
const ABBREVIATION_WEIGHT: f64 = 0.7;
const MIN_PREFIX_LEN: usize = 3;
const MIN_CONTAINED_LEN: usize = 4;

/// Best candidate for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub title: String,
    pub score: f64,
}

impl MatchResult {
    /// Confidence band of this match.
    #[must_use]
    pub fn confidence(&self) -> MatchConfidence {
        MatchConfidence::from_score(self.score)
    }
}

/// Coarse band a score falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    High,
    Medium,
    Low,
    None,
}

impl MatchConfidence {
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_CONFIDENCE_THRESHOLD {
            Self::High
        } else if score >= MATCH_THRESHOLD {
            Self::Medium
        } else if score >= SUGGESTION_THRESHOLD {
            Self::Low
        } else {
            Self::None
        }
    }
}

/// Lowercase, drop everything that is neither alphanumeric nor whitespace,
/// and collapse runs of whitespace.
#[must_use]
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Classic dynamic-programming Levenshtein distance over chars.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// `1 - distance / max_len` over already-normalized strings.
fn edit_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Credit one word earns against another.
fn word_weight(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let short_len = short.chars().count();

    if short_len >= MIN_PREFIX_LEN && long.starts_with(short) {
        return PREFIX_WEIGHT;
    }
    if short_len >= MIN_CONTAINED_LEN && long.contains(short) {
        return CONTAINED_WEIGHT;
    }
    if short_len == 2 && long.chars().count() > 2 {
        let head: String = long.chars().take(2).collect();
        if levenshtein(short, &head) == 0 {
            return ABBREVIATION_WEIGHT;
        }
    }
    0.0
}

/// Overlap of the shorter word list with the longer one, in [0, 1].
fn word_overlap(query_words: &[&str], target_words: &[&str]) -> f64 {
    let (shorter, longer) = if query_words.len() <= target_words.len() {
        (query_words, target_words)
    } else {
        (target_words, query_words)
    };
    if shorter.is_empty() {
        return 0.0;
    }

    let credit: f64 = shorter
        .iter()
        .map(|w| {
            longer
                .iter()
                .map(|l| word_weight(w, l))
                .fold(0.0_f64, f64::max)
        })
        .sum();

    let ratio = credit / shorter.len() as f64;
    let coverage = shorter.len() as f64 / longer.len() as f64;
    ratio * (0.85 + 0.15 * coverage)
}

/// Similarity of a free-form `query` to a checkbox `target`, in [0, 1].
///
/// # Example
///
/// ```
/// use taskboard::matcher::{score, MATCH_THRESHOLD};
///
/// assert_eq!(score("Build API Endpoints", "build api endpoints!"), 1.0);
/// assert!(score("API", "Build API Endpoints") < MATCH_THRESHOLD);
/// assert!(score("Implement auth", "Implement authentication") >= MATCH_THRESHOLD);
/// ```
#[must_use]
pub fn score(query: &str, target: &str) -> f64 {
    let q = normalize(query);
    let t = normalize(target);
    if q.is_empty() || t.is_empty() {
        return 0.0;
    }
    if q == t {
        return 1.0;
    }

    let q_words: Vec<&str> = q.split(' ').collect();
    let t_words: Vec<&str> = t.split(' ').collect();

    let mut overlap = word_overlap(&q_words, &t_words);
    if q_words.len() == 1 && t_words.len() >= 3 {
        overlap *= SINGLE_WORD_PENALTY;
    }
    if overlap > 0.0 && (t.contains(&q) || q.contains(&t)) {
        overlap += SUBSTRING_BONUS;
    }

    overlap.max(edit_similarity(&q, &t)).min(1.0)
}

/// Best candidate scoring at least [`MATCH_THRESHOLD`]; ties keep the
/// earliest candidate.
#[must_use]
pub fn find_best_match<S: AsRef<str>>(query: &str, candidates: &[S]) -> Option<MatchResult> {
    best_candidate(query, candidates).filter(|m| m.score >= MATCH_THRESHOLD)
}

/// Best candidate that fell short of acceptance but is still worth
/// suggesting (score in `[SUGGESTION_THRESHOLD, MATCH_THRESHOLD)`).
#[must_use]
pub fn suggest<S: AsRef<str>>(query: &str, candidates: &[S]) -> Option<MatchResult> {
    best_candidate(query, candidates)
        .filter(|m| m.score >= SUGGESTION_THRESHOLD && m.score < MATCH_THRESHOLD)
}

fn best_candidate<S: AsRef<str>>(query: &str, candidates: &[S]) -> Option<MatchResult> {
    let mut best: Option<MatchResult> = None;
    for candidate in candidates {
        let title = candidate.as_ref();
        let s = score(query, title);
        if best.as_ref().is_none_or(|b| s > b.score) {
            best = Some(MatchResult {
                title: title.to_string(),
                score: s,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Build   API-Endpoints!! "), "build apiendpoints");
        assert_eq!(normalize("Set up **DB**: schema"), "set up db schema");
        assert_eq!(normalize("???"), "");
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_exact_title_scores_one() {
        assert_eq!(score("Performance Testing", "Performance Testing"), 1.0);
        assert_eq!(score("performance testing.", "Performance Testing"), 1.0);
    }

    #[test]
    fn test_single_generic_word_is_rejected() {
        let s = score("API", "Build API Endpoints");
        assert!(s < MATCH_THRESHOLD, "score was {s}");
        assert!(find_best_match("API", &["Build API Endpoints"]).is_none());
        // Still close enough to suggest
        assert!(suggest("API", &["Build API Endpoints"]).is_some());
    }

    #[test]
    fn test_single_word_against_two_words_is_not_penalized() {
        assert!(score("Deploy", "Deploy service") >= MATCH_THRESHOLD);
    }

    #[test]
    fn test_prefix_abbreviation() {
        let s = score("Implement auth", "Implement authentication");
        assert!(s >= MATCH_THRESHOLD, "score was {s}");
    }

    #[test]
    fn test_two_letter_abbreviation_requires_exact_prefix() {
        assert_eq!(word_weight("ui", "uikit"), ABBREVIATION_WEIGHT);
        assert_eq!(word_weight("db", "database"), 0.0);
        assert_eq!(word_weight("ab", "ab"), 1.0);
    }

    #[test]
    fn test_short_prefix_not_credited() {
        assert_eq!(word_weight("a", "api"), 0.0);
        assert_eq!(word_weight("api", "apis"), PREFIX_WEIGHT);
        assert_eq!(word_weight("auth", "oauth"), CONTAINED_WEIGHT);
        assert_eq!(word_weight("uth", "oauth"), 0.0);
    }

    #[test]
    fn test_subset_of_words_scores_high() {
        let s = score("Write tests", "Write unit tests");
        assert!(s >= HIGH_CONFIDENCE_THRESHOLD, "score was {s}");
    }

    #[test]
    fn test_typo_rescued_by_edit_distance() {
        let s = score("Setup databse", "Setup database");
        assert!(s >= HIGH_CONFIDENCE_THRESHOLD, "score was {s}");
    }

    #[test]
    fn test_unrelated_text_scores_low() {
        assert!(score("Refactor logging", "Deploy to production") < SUGGESTION_THRESHOLD);
        assert_eq!(score("", "anything"), 0.0);
        assert_eq!(score("!!!", "anything"), 0.0);
    }

    #[test]
    fn test_score_is_bounded() {
        let cases = [
            ("a b c", "a b c d e f"),
            ("write", "write"),
            ("x", "y"),
            ("Build API", "Build API Endpoints and more"),
        ];
        for (a, b) in cases {
            let s = score(a, b);
            assert!((0.0..=1.0).contains(&s), "{a} vs {b} = {s}");
        }
    }

    #[test]
    fn test_find_best_match_picks_highest() {
        let titles = ["Setup Environment", "Database Schema", "Performance Testing"];
        let m = find_best_match("database schema design", &titles).unwrap();
        assert_eq!(m.title, "Database Schema");
        assert!(m.score >= MATCH_THRESHOLD);

        let exact = find_best_match("Performance Testing", &titles).unwrap();
        assert_eq!(exact.score, 1.0);
        assert_eq!(exact.confidence(), MatchConfidence::High);
    }

    #[test]
    fn test_find_best_match_ties_keep_first() {
        let titles = ["Deploy", "Deploy"];
        let m = find_best_match("Deploy", &titles).unwrap();
        assert_eq!(m.title, "Deploy");
        assert!(find_best_match::<&str>("Deploy", &[]).is_none());
    }

    #[test]
    fn test_confidence_bands() {
        assert_eq!(MatchConfidence::from_score(0.85), MatchConfidence::High);
        assert_eq!(MatchConfidence::from_score(0.6), MatchConfidence::Medium);
        assert_eq!(MatchConfidence::from_score(0.4), MatchConfidence::Low);
        assert_eq!(MatchConfidence::from_score(0.39), MatchConfidence::None);
    }
}
