//! Seed/LLM agreement check that decides whether seeds can be trusted.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::alias::AliasCanonicalizer;
use crate::ingest::{LlmTerm, SeedTerm};

/// Seeds are distrusted when they outnumber LLM terms by more than this.
pub const MAX_SEED_LLM_RATIO: f64 = 20.0;

/// Seeds are distrusted when fewer than this share of LLM terms are seeds.
pub const MIN_OVERLAP_RATIO: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedQualityStats {
    /// Raw input sizes, before canonicalization and dedup.
    pub seed_count: usize,
    pub llm_count: usize,
    /// Share of LLM canonicals that also appear among the seeds.
    pub overlap_ratio: f64,
    /// Seed count over LLM count; infinite when there are no LLM terms.
    pub seed_llm_ratio: f64,
}

/// Decide whether to fall back to LLM-only consolidation.
///
/// Terms are compared canonicalized and lowercased. With no seeds the
/// answer is always fallback; with seeds but no LLM terms the seeds are kept,
/// since there is nothing to fall back to.
pub fn assess_seed_quality(
    seeds: &[SeedTerm],
    llm_terms: &[LlmTerm],
    aliases: &AliasCanonicalizer,
) -> (bool, SeedQualityStats) {
    let seed_set: HashSet<String> = seeds
        .iter()
        .map(|s| aliases.resolve(&s.term).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    let llm_set: HashSet<String> = llm_terms
        .iter()
        .map(|t| aliases.resolve(&t.canonical).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let overlap = seed_set.intersection(&llm_set).count();
    let overlap_ratio = if llm_set.is_empty() {
        0.0
    } else {
        overlap as f64 / llm_set.len() as f64
    };
    let seed_llm_ratio = if llm_set.is_empty() {
        f64::INFINITY
    } else {
        seed_set.len() as f64 / llm_set.len() as f64
    };

    let stats = SeedQualityStats {
        seed_count: seeds.len(),
        llm_count: llm_terms.len(),
        overlap_ratio,
        seed_llm_ratio,
    };

    let fallback = if seed_set.is_empty() {
        true
    } else if llm_set.is_empty() {
        false
    } else {
        seed_llm_ratio > MAX_SEED_LLM_RATIO || overlap_ratio < MIN_OVERLAP_RATIO
    };
    (fallback, stats)
}
