//! Deterministic seed mining over normalized deck text.
//!
//! ## Per line
//!
//! ```text
//! 1. Update the running section weight (header lines may change it)
//! 2. Extract proper-case / all-caps / joined / camel-case spans
//! 3. Whitespace-normalize each span and run the rejection chain
//! 4. Add the section weight to the span's running total
//! ```
//!
//! After the scan, terms whose total reaches `min_freq` are ranked by weight,
//! truncated to `max_terms`, and annotated with a context snippet.

pub mod filters;

pub use filters::{CandidatePatterns, FilterStats, Rejection, SectionWeighter, TermFilters};

use std::collections::HashMap;

use regex::RegexBuilder;
use tracing::debug;

use crate::config::BiasConfig;
use crate::error::Result;
use crate::ingest::SeedTerm;

/// Characters of context kept on each side of a term occurrence.
pub const CONTEXT_RADIUS_CHARS: usize = 40;

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_term(term: &str) -> String {
    term.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone)]
pub struct SeedMiner {
    patterns: CandidatePatterns,
    filters: TermFilters,
    weighter: SectionWeighter,
    use_section_weighting: bool,
    default_weight: f64,
    min_freq: f64,
    max_terms: usize,
}

impl SeedMiner {
    pub fn new(config: &BiasConfig) -> Result<Self> {
        Ok(Self {
            patterns: CandidatePatterns::new()?,
            filters: TermFilters::new(config)?,
            weighter: SectionWeighter::new(config),
            use_section_weighting: config.use_section_weighting,
            default_weight: config.default_section_weight,
            min_freq: config.min_freq,
            max_terms: config.max_terms,
        })
    }

    /// Override the frequency floor and output cap from the config.
    pub fn with_limits(mut self, min_freq: f64, max_terms: usize) -> Self {
        self.min_freq = min_freq;
        self.max_terms = max_terms;
        self
    }

    /// Mine seed terms from normalized deck text.
    pub fn mine(&self, text: &str) -> (Vec<SeedTerm>, FilterStats) {
        let mut stats = FilterStats::default();
        let mut weighter = self.weighter.clone();
        // term → (accumulated weight, first-seen index)
        let mut counts: HashMap<String, (f64, usize)> = HashMap::new();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let section_weight = weighter.observe(line, &mut stats);
            let weight = if self.use_section_weighting {
                section_weight
            } else {
                self.default_weight
            };

            for span in self.patterns.candidates(line) {
                let term = normalize_term(span);
                if term.is_empty() {
                    continue;
                }
                if let Err(rejection) = self.filters.check_candidate(&term) {
                    debug!(term = %term, ?rejection, "candidate rejected");
                    stats.record(rejection);
                    continue;
                }
                let next_index = counts.len();
                counts.entry(term).or_insert((0.0, next_index)).0 += weight;
            }
        }

        let mut ranked: Vec<(String, f64, usize)> = counts
            .into_iter()
            .filter(|(_, (weight, _))| *weight >= self.min_freq)
            .map(|(term, (weight, first))| (term, weight, first))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked.truncate(self.max_terms);

        let seeds: Vec<SeedTerm> = ranked
            .into_iter()
            .map(|(term, frequency, _)| {
                let contexts = find_contexts(text, &term);
                SeedTerm {
                    term,
                    frequency,
                    contexts,
                }
            })
            .collect();

        stats.output_terms = seeds.len();
        stats.log();
        (seeds, stats)
    }
}

/// Snippet around the first case-insensitive occurrence of `term`, with
/// newlines flattened. Empty when the term does not occur.
pub fn find_contexts(text: &str, term: &str) -> Vec<String> {
    let term = term.trim();
    if term.is_empty() {
        return Vec::new();
    }
    let Ok(re) = RegexBuilder::new(&regex::escape(term))
        .case_insensitive(true)
        .build()
    else {
        return Vec::new();
    };

    re.find(text)
        .map(|m| {
            let start = text[..m.start()]
                .char_indices()
                .rev()
                .nth(CONTEXT_RADIUS_CHARS - 1)
                .map(|(i, _)| i)
                .unwrap_or(0);
            let end = text[m.end()..]
                .char_indices()
                .nth(CONTEXT_RADIUS_CHARS)
                .map(|(i, _)| m.end() + i)
                .unwrap_or(text.len());
            text[start..end].replace('\n', " ").trim().to_string()
        })
        .into_iter()
        .collect()
}
