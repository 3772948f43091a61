//! Candidate span patterns, rejection filters and section weighting.
//!
//! `TermFilters` is shared with the consolidator: its `is_allowed` check is the
//! allow-filter applied to both seed and LLM terms.

use std::collections::{BTreeMap, HashSet};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::BiasConfig;
use crate::error::{DeckBiasError, Result};

const PROPER_CASE: &str = r"\b(?:[A-Z][a-z]+(?:\s+[A-Z][a-z]+){0,3})\b";
const ALL_CAPS: &str = r"\b[A-Z0-9&/\-]{2,}\b";
const MIXED_TOKEN: &str = r"\b[A-Za-z]+(?:[-/][A-Za-z0-9]+)+\b";
const CAMEL_CASE: &str = r"\b[A-Z][a-z]+[A-Z]\w+\b";
const NUMBER_LIKE: &str = r"^\d{1,4}(?:[./-]\d{1,4})?$";

/// Lines with at most this many words may be section headers.
pub const SECTION_HEADER_MAX_WORDS: usize = 8;

/// Counters for how often each mining filter fired.
///
/// Reporting only; nothing branches on these values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    pub length: usize,
    pub stop_words: usize,
    pub deny_exact: usize,
    pub numbers: usize,
    pub deny_patterns: usize,
    pub total_filtered: usize,
    pub section_weight_hits: usize,
    pub output_terms: usize,
}

impl FilterStats {
    pub fn log(&self) {
        info!(
            stop_words = self.stop_words,
            numbers = self.numbers,
            deny_exact = self.deny_exact,
            patterns = self.deny_patterns,
            length = self.length,
            filtered_total = self.total_filtered,
            section_weight_hits = self.section_weight_hits,
            output_terms = self.output_terms,
            "mine filter stats"
        );
    }
}

/// Why a mined candidate was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Length,
    StopWord,
    DenyExact,
    NumberLike,
    DenyPattern,
}

/// The four span extractors, compiled once.
#[derive(Debug, Clone)]
pub struct CandidatePatterns {
    spans: [Regex; 4],
}

impl CandidatePatterns {
    pub fn new() -> Result<Self> {
        Ok(Self {
            spans: [
                compile(PROPER_CASE, false)?,
                compile(ALL_CAPS, false)?,
                compile(MIXED_TOKEN, false)?,
                compile(CAMEL_CASE, false)?,
            ],
        })
    }

    /// All candidate spans on a line, pattern by pattern. Overlaps are kept.
    pub fn candidates<'t>(&self, line: &'t str) -> Vec<&'t str> {
        self.spans
            .iter()
            .flat_map(|re| re.find_iter(line).map(|m| m.as_str()))
            .collect()
    }
}

/// Length, stop-word, exact-deny, number and deny-regex filters.
#[derive(Debug, Clone)]
pub struct TermFilters {
    min_len: usize,
    max_len: usize,
    stop_words: HashSet<String>,
    deny_exact: HashSet<String>,
    deny_patterns: Vec<Regex>,
    number_like: Regex,
}

impl TermFilters {
    pub fn new(config: &BiasConfig) -> Result<Self> {
        let deny_patterns = config
            .deny_patterns
            .iter()
            .map(|p| compile(p, true))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            min_len: config.min_term_length,
            max_len: config.max_term_length,
            stop_words: config.stop_words.iter().map(|s| s.to_lowercase()).collect(),
            deny_exact: config.deny_exact.iter().map(|s| s.to_lowercase()).collect(),
            deny_patterns,
            number_like: compile(NUMBER_LIKE, false)?,
        })
    }

    pub fn has_valid_length(&self, term: &str) -> bool {
        let len = term.chars().count();
        len >= self.min_len && len <= self.max_len
    }

    pub fn is_stop_word(&self, term: &str) -> bool {
        self.stop_words.contains(&term.to_lowercase())
    }

    pub fn is_denied_exact(&self, term: &str) -> bool {
        self.deny_exact.contains(&term.to_lowercase())
    }

    /// Bare numbers, short dates/ratios (`12/31`, `3.5`) and percentages.
    pub fn is_number_like(&self, term: &str) -> bool {
        let clean = term.replace(',', "");
        if self.number_like.is_match(&clean) {
            return true;
        }
        match clean.strip_suffix('%') {
            Some(digits) => !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()),
            None => false,
        }
    }

    pub fn matches_deny_pattern(&self, term: &str) -> bool {
        self.deny_patterns.iter().any(|re| re.is_match(term))
    }

    /// The allow-filter used during consolidation: length, stop word and
    /// exact deny. Number and pattern checks only apply while mining.
    pub fn is_allowed(&self, term: &str) -> bool {
        self.has_valid_length(term) && !self.is_stop_word(term) && !self.is_denied_exact(term)
    }

    /// Run the full mining filter chain in order; the first failure wins.
    pub fn check_candidate(&self, term: &str) -> std::result::Result<(), Rejection> {
        if !self.has_valid_length(term) {
            return Err(Rejection::Length);
        }
        if self.is_stop_word(term) {
            return Err(Rejection::StopWord);
        }
        if self.is_denied_exact(term) {
            return Err(Rejection::DenyExact);
        }
        if self.is_number_like(term) {
            return Err(Rejection::NumberLike);
        }
        if self.matches_deny_pattern(term) {
            return Err(Rejection::DenyPattern);
        }
        Ok(())
    }
}

impl FilterStats {
    pub fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::Length => self.length += 1,
            Rejection::StopWord => self.stop_words += 1,
            Rejection::DenyExact => self.deny_exact += 1,
            Rejection::NumberLike => self.numbers += 1,
            Rejection::DenyPattern => self.deny_patterns += 1,
        }
        self.total_filtered += 1;
    }
}

/// Running section weight across the lines of a deck.
#[derive(Debug, Clone)]
pub struct SectionWeighter {
    keywords: BTreeMap<String, f64>,
    default_weight: f64,
    current: f64,
}

impl SectionWeighter {
    pub fn new(config: &BiasConfig) -> Self {
        Self {
            keywords: config.section_keyword_weights.clone(),
            default_weight: config.default_section_weight,
            current: config.default_section_weight,
        }
    }

    /// Update the running weight for `line` and return it.
    ///
    /// Header-like lines (trailing colon, all caps, or at most
    /// `SECTION_HEADER_MAX_WORDS` words) start a new section: the weight of
    /// the strongest keyword they contain, or the default. Other lines keep
    /// the weight of the section they sit in.
    pub fn observe(&mut self, line: &str, stats: &mut FilterStats) -> f64 {
        let stripped = line.trim();
        if stripped.is_empty() || !is_header_like(stripped) {
            return self.current;
        }

        let normalized = normalize_header(stripped);
        let mut matched: Option<f64> = None;
        for (keyword, weight) in &self.keywords {
            if normalized.contains(keyword.as_str()) && matched.map_or(true, |w| *weight > w) {
                matched = Some(*weight);
            }
        }

        self.current = match matched {
            Some(weight) => {
                stats.section_weight_hits += 1;
                weight
            }
            None => self.default_weight,
        };
        self.current
    }
}

fn is_header_like(line: &str) -> bool {
    line.ends_with(':')
        || is_all_uppercase(line)
        || line.split_whitespace().count() <= SECTION_HEADER_MAX_WORDS
}

fn is_all_uppercase(line: &str) -> bool {
    line.chars().any(char::is_uppercase) && !line.chars().any(char::is_lowercase)
}

/// Lowercase, with every run of non `[a-z0-9 ]` characters replaced by a space.
fn normalize_header(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_run = false;
    for c in line.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' ' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push(' ');
            in_run = true;
        }
    }
    out.trim().to_string()
}

fn compile(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|source| DeckBiasError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters() -> TermFilters {
        TermFilters::new(&BiasConfig::default()).unwrap()
    }

    #[test]
    fn extracts_all_four_span_kinds() {
        let patterns = CandidatePatterns::new().unwrap();
        let spans = patterns.candidates("Dyson Sphere runs GPU clusters via GPU-as-a-Service with OpenAI");
        assert!(spans.contains(&"Dyson Sphere"));
        assert!(spans.contains(&"GPU"));
        assert!(spans.contains(&"GPU-as-a-Service"));
        assert!(spans.contains(&"OpenAI"));
    }

    #[test]
    fn proper_case_phrases_cap_at_four_words() {
        let patterns = CandidatePatterns::new().unwrap();
        let spans = patterns.candidates("Alpha Beta Gamma Delta Epsilon");
        assert_eq!(spans[0], "Alpha Beta Gamma Delta");
        assert_eq!(spans[1], "Epsilon");
    }

    #[test]
    fn number_like_terms() {
        let f = filters();
        assert!(f.is_number_like("2024"));
        assert!(f.is_number_like("12/31"));
        assert!(f.is_number_like("1,000"));
        assert!(f.is_number_like("45%"));
        assert!(!f.is_number_like("%"));
        assert!(!f.is_number_like("4G"));
        assert!(!f.is_number_like("12345"));
    }

    #[test]
    fn filter_chain_order() {
        let mut cfg = BiasConfig::default();
        cfg.deny_exact.insert("acme".into());
        let f = TermFilters::new(&cfg).unwrap();
        assert_eq!(f.check_candidate("A"), Err(Rejection::Length));
        assert_eq!(f.check_candidate("The"), Err(Rejection::StopWord));
        assert_eq!(f.check_candidate("ACME"), Err(Rejection::DenyExact));
        assert_eq!(f.check_candidate("3.5"), Err(Rejection::NumberLike));
        assert_eq!(f.check_candidate("10:30"), Err(Rejection::DenyPattern));
        assert_eq!(f.check_candidate("main.py"), Err(Rejection::DenyPattern));
        assert_eq!(f.check_candidate("DEMO-1"), Err(Rejection::DenyPattern));
        assert_eq!(f.check_candidate("Kubernetes"), Ok(()));
    }

    #[test]
    fn allow_filter_ignores_number_and_pattern_checks() {
        let f = filters();
        assert!(f.is_allowed("2024"));
        assert!(f.is_allowed("main.py"));
        assert!(!f.is_allowed("this"));
        assert!(!f.is_allowed(""));
    }

    #[test]
    fn section_weight_follows_keyword_headers() {
        let cfg = BiasConfig::default();
        let mut weighter = SectionWeighter::new(&cfg);
        let mut stats = FilterStats::default();

        assert_eq!(weighter.observe("Our Leadership Team:", &mut stats), 2.0);
        // Long body lines keep the section weight, keyword or not.
        let body = "we partner with many customers across the world to deliver value";
        assert_eq!(weighter.observe(body, &mut stats), 2.0);
        assert_eq!(weighter.observe("Confidential", &mut stats), 0.3);
        assert_eq!(weighter.observe("Market Overview", &mut stats), 1.0);
        assert_eq!(stats.section_weight_hits, 2);
    }

    #[test]
    fn strongest_keyword_wins() {
        let cfg = BiasConfig::default();
        let mut weighter = SectionWeighter::new(&cfg);
        let mut stats = FilterStats::default();
        assert_eq!(weighter.observe("Product Team", &mut stats), 2.0);
        assert_eq!(weighter.observe("Customer Confidential", &mut stats), 1.3);
    }
}
