//! Seed + LLM term consolidation.
//!
//! ## Flow
//!
//! ```text
//!  seeds ──┐                         ┌── allow-filter ── admissibility ──┐
//!          ├── seed quality ── fallback?                                 ├── records ── sort ── payloads
//!  LLM  ───┘                         └── allow/class/priority/presence ──┘
//! ```
//!
//! Every term is whitespace-normalized and alias-canonicalized before it is
//! keyed, so OCR variants collapse onto one record. Records are keyed by the
//! lowercased canonical; the first casing seen is the one emitted.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::admissibility::{self, TermAdmissibility};
use super::alias::AliasCanonicalizer;
use super::quality::assess_seed_quality;
use super::scorer::{Source, TermPayload, TermRecord};
use crate::config::BiasConfig;
use crate::error::Result;
use crate::ingest::{parse_llm_terms, LlmTerm, SeedTerm};
use crate::mining::TermFilters;

/// Priority floor for any seed that survives filtering.
pub const SEED_PRIORITY_FLOOR: f64 = 0.6;

pub const NOTE_ALIAS_NOT_FOUND: &str = "Alias not found in deck";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationStats {
    pub seed_used: usize,
    pub seed_filtered: usize,
    pub llm_used: usize,
    pub llm_filtered: usize,
    pub llm_filtered_priority: usize,
    pub fallback: bool,
    pub output_terms: usize,
}

impl ConsolidationStats {
    pub fn log(&self) {
        info!(
            seed_used = self.seed_used,
            seed_filtered = self.seed_filtered,
            llm_used = self.llm_used,
            llm_filtered = self.llm_filtered,
            llm_filtered_priority = self.llm_filtered_priority,
            fallback = self.fallback,
            output_terms = self.output_terms,
            "consolidation usage"
        );
    }
}

/// Why an LLM term was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LlmRejection {
    NotAllowed,
    Class,
    Priority,
    Absent,
}

/// Merges seed and LLM terms into scored, sorted payloads.
pub struct Consolidator {
    filters: TermFilters,
    aliases: AliasCanonicalizer,
    admissibility: Box<dyn TermAdmissibility>,
    allowed_classes: BTreeSet<String>,
    exempt_classes: BTreeSet<String>,
    /// `None` when the priority gate is disabled.
    priority_threshold: Option<f64>,
}

impl Consolidator {
    pub fn new(config: &BiasConfig) -> Result<Self> {
        Ok(Self {
            filters: TermFilters::new(config)?,
            aliases: AliasCanonicalizer::new(config),
            admissibility: admissibility::from_config(config),
            allowed_classes: config.high_value_classes.clone(),
            exempt_classes: config.priority_exempt_classes.clone(),
            priority_threshold: config
                .use_llm_priority_threshold
                .then_some(config.llm_priority_threshold),
        })
    }

    /// Replace the admissibility filter chosen by the config.
    pub fn with_admissibility(mut self, filter: Box<dyn TermAdmissibility>) -> Self {
        self.admissibility = filter;
        self
    }

    pub fn aliases(&self) -> &AliasCanonicalizer {
        &self.aliases
    }

    /// Consolidate a raw LLM payload (list, `{"terms": [...]}`, or anything
    /// else, which counts as empty).
    pub fn consolidate_value(
        &self,
        deck_text: &str,
        seeds: &[SeedTerm],
        llm_payload: Option<&Value>,
        allow_llm_aliases: bool,
    ) -> (Vec<TermPayload>, ConsolidationStats) {
        let llm_terms = parse_llm_terms(llm_payload);
        self.consolidate(deck_text, seeds, &llm_terms, allow_llm_aliases)
    }

    pub fn consolidate(
        &self,
        deck_text: &str,
        seeds: &[SeedTerm],
        llm_terms: &[LlmTerm],
        allow_llm_aliases: bool,
    ) -> (Vec<TermPayload>, ConsolidationStats) {
        let text_lower = deck_text.to_lowercase();
        let mut records: HashMap<String, TermRecord> = HashMap::new();
        let mut stats = ConsolidationStats::default();

        let (fallback, quality) = assess_seed_quality(seeds, llm_terms, &self.aliases);
        stats.fallback = fallback;
        info!(
            seed_count = quality.seed_count,
            llm_count = quality.llm_count,
            ratio = quality.seed_llm_ratio,
            overlap = quality.overlap_ratio,
            fallback,
            "seed quality"
        );

        if !fallback {
            for seed in seeds {
                let term = self.aliases.resolve(&seed.term);
                if !self.accepts(&term) {
                    debug!(term = %term, "seed filtered");
                    stats.seed_filtered += 1;
                    continue;
                }
                // Truncates; negative or NaN frequencies saturate to zero.
                let freq = seed.frequency as u64;
                let record = records
                    .entry(term.to_lowercase())
                    .or_insert_with(|| TermRecord::new(term.as_str(), Source::Seed));
                record.frequency = record.frequency.max(freq);
                record.present_in_deck = true;
                record.priority = record.priority.max(SEED_PRIORITY_FLOOR);
                stats.seed_used += 1;
            }
        }

        for term in llm_terms {
            match self.merge_llm_term(&text_lower, term, allow_llm_aliases, &mut records) {
                Ok(()) => stats.llm_used += 1,
                Err(LlmRejection::Priority) => stats.llm_filtered_priority += 1,
                Err(reason) => {
                    debug!(canonical = %term.canonical, ?reason, "LLM term filtered");
                    stats.llm_filtered += 1;
                }
            }
        }

        let mut payloads: Vec<TermPayload> = records.values().map(TermRecord::to_payload).collect();
        sort_payloads(&mut payloads);
        stats.output_terms = payloads.len();
        stats.log();
        (payloads, stats)
    }

    /// Allow-filter followed by the admissibility filter.
    fn accepts(&self, term: &str) -> bool {
        !term.is_empty() && self.filters.is_allowed(term) && self.admissibility.admits(term)
    }

    fn merge_llm_term(
        &self,
        text_lower: &str,
        term: &LlmTerm,
        allow_llm_aliases: bool,
        records: &mut HashMap<String, TermRecord>,
    ) -> std::result::Result<(), LlmRejection> {
        let canonical = self.aliases.resolve(&term.canonical);
        if !self.accepts(&canonical) {
            return Err(LlmRejection::NotAllowed);
        }

        let classes: BTreeSet<String> = term
            .classes
            .iter()
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .collect();
        if !classes.is_empty() && classes.is_disjoint(&self.allowed_classes) {
            return Err(LlmRejection::Class);
        }

        if let Some(threshold) = self.priority_threshold {
            if term.priority < threshold && classes.is_disjoint(&self.exempt_classes) {
                debug!(canonical = %canonical, priority = term.priority, "LLM term below priority threshold");
                return Err(LlmRejection::Priority);
            }
        }

        let variants: Vec<String> = term
            .variants
            .iter()
            .map(|v| self.aliases.resolve(v))
            .filter(|v| !v.is_empty())
            .collect();

        let presence = detect_presence(text_lower, &canonical, &variants);
        if presence.is_none() && !allow_llm_aliases {
            return Err(LlmRejection::Absent);
        }

        let canonical_lower = canonical.to_lowercase();
        let record = records
            .entry(canonical_lower.clone())
            .or_insert_with(|| TermRecord::new(canonical.as_str(), Source::Llm));
        record.source = record.source.with_llm();
        record.priority = record.priority.max(term.priority);
        record.classes.extend(classes);
        record.variants.extend(
            variants
                .iter()
                .filter(|v| v.to_lowercase() != canonical_lower)
                .cloned(),
        );

        match presence {
            Some((count, matched)) => {
                record.present_in_deck = true;
                record.frequency = record.frequency.max(count);
                if matched.to_lowercase() != canonical_lower {
                    record.notes = format!("Matched variant: {matched}");
                }
            }
            None => {
                record.present_in_deck |= term.present_in_deck;
                record.notes = NOTE_ALIAS_NOT_FOUND.to_string();
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Consolidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consolidator")
            .field("admissibility", &self.admissibility.name())
            .field("allowed_classes", &self.allowed_classes)
            .field("exempt_classes", &self.exempt_classes)
            .field("priority_threshold", &self.priority_threshold)
            .finish_non_exhaustive()
    }
}

/// Case-insensitive, non-overlapping literal occurrence count.
pub fn count_occurrences(text_lower: &str, term: &str) -> u64 {
    if term.is_empty() {
        return 0;
    }
    text_lower.matches(term.to_lowercase().as_str()).count() as u64
}

/// First of `canonical`, then each variant in order, that occurs in the text,
/// with its count.
fn detect_presence<'a>(
    text_lower: &str,
    canonical: &'a str,
    variants: &'a [String],
) -> Option<(u64, &'a str)> {
    std::iter::once(canonical)
        .chain(variants.iter().map(String::as_str))
        .find_map(|form| match count_occurrences(text_lower, form) {
            0 => None,
            n => Some((n, form)),
        })
}

/// Descending by `(score, frequency, canonical)`.
pub fn sort_payloads(payloads: &mut [TermPayload]) {
    payloads.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.frequency.cmp(&a.frequency))
            .then_with(|| b.canonical.cmp(&a.canonical))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::admissibility::TitlecaseAdmissibility;

    fn consolidator() -> Consolidator {
        Consolidator::new(&BiasConfig::default()).unwrap()
    }

    fn llm(canonical: &str, classes: &[&str], priority: f64) -> LlmTerm {
        LlmTerm {
            canonical: canonical.into(),
            variants: Vec::new(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            priority,
            present_in_deck: false,
        }
    }

    fn seed(term: &str, frequency: f64) -> SeedTerm {
        SeedTerm {
            term: term.into(),
            frequency,
            contexts: Vec::new(),
        }
    }

    #[test]
    fn seed_and_llm_merge_into_one_record() {
        let text = "Dyson Sphere builds GPU racks. Dyson Sphere ships.";
        let seeds = vec![seed("Dyson Sphere", 2.0), seed("GPU", 1.0)];
        let llms = vec![llm("dyson sphere", &["ORG"], 0.9)];
        let (payloads, stats) = consolidator().consolidate(text, &seeds, &llms, false);

        assert!(!stats.fallback);
        assert_eq!(stats.seed_used, 2);
        assert_eq!(stats.llm_used, 1);
        assert_eq!(payloads.len(), 2);
        let dyson = &payloads[0];
        assert_eq!(dyson.canonical, "Dyson Sphere");
        assert_eq!(dyson.source, Source::SeedLlm);
        assert_eq!(dyson.classes, vec!["ORG"]);
        assert_eq!(dyson.frequency, 2);
        assert!((dyson.priority - 0.9).abs() < 1e-9);
    }

    #[test]
    fn seeds_get_priority_floor_and_presence() {
        let (payloads, _) =
            consolidator().consolidate("GPU", &[seed("GPU", 3.7)], &[], false);
        assert_eq!(payloads[0].source, Source::Seed);
        assert_eq!(payloads[0].frequency, 3);
        assert!(payloads[0].present_in_deck);
        assert!((payloads[0].priority - SEED_PRIORITY_FLOOR).abs() < 1e-9);
    }

    #[test]
    fn disallowed_classes_are_filtered() {
        let llms = vec![llm("Paris", &["LOCATION"], 0.9), llm("Kubernetes", &[], 0.9)];
        let (payloads, stats) =
            consolidator().consolidate("Paris runs Kubernetes", &[], &llms, false);
        assert_eq!(stats.llm_filtered, 1);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].canonical, "Kubernetes");
    }

    #[test]
    fn low_priority_tech_is_gated() {
        let llms = vec![llm("Kubernetes", &["TECH"], 0.3)];
        let (payloads, stats) = consolidator().consolidate("Kubernetes", &[], &llms, false);
        assert!(payloads.is_empty());
        assert_eq!(stats.llm_filtered_priority, 1);
        assert_eq!(stats.llm_filtered, 0);
    }

    #[test]
    fn priority_gate_can_be_disabled() {
        let mut cfg = BiasConfig::default();
        cfg.use_llm_priority_threshold = false;
        let llms = vec![llm("Kubernetes", &["TECH"], 0.3)];
        let (payloads, _) = Consolidator::new(&cfg)
            .unwrap()
            .consolidate("Kubernetes", &[], &llms, false);
        assert_eq!(payloads.len(), 1);
    }

    #[test]
    fn variant_presence_sets_note() {
        let mut term = llm("Liam Nguyen", &["PERSON"], 0.9);
        term.variants = vec!["Liam".into()];
        let (payloads, _) =
            consolidator().consolidate("Our CEO Liam spoke", &[], &[term], false);
        assert_eq!(payloads[0].notes, "Matched variant: Liam");
        assert_eq!(payloads[0].variants, vec!["Liam"]);
        assert!(payloads[0].present_in_deck);
        assert_eq!(payloads[0].frequency, 1);
    }

    #[test]
    fn absent_terms_need_alias_allowance() {
        let mut term = llm("Globex", &["ORG"], 0.9);
        term.present_in_deck = true;
        let (rejected, stats) = consolidator().consolidate("nothing here", &[], &[term.clone()], false);
        assert!(rejected.is_empty());
        assert_eq!(stats.llm_filtered, 1);

        let (accepted, _) = consolidator().consolidate("nothing here", &[], &[term], true);
        assert_eq!(accepted[0].notes, NOTE_ALIAS_NOT_FOUND);
        // Self-claimed presence is honoured on the alias path.
        assert!(accepted[0].present_in_deck);
        assert_eq!(accepted[0].frequency, 0);
    }

    #[test]
    fn ocr_variants_collapse_onto_canonical() {
        let llms = vec![llm("Dyson Spher", &["ORG"], 0.9)];
        let (payloads, _) = consolidator().consolidate("Dyson Sphere", &[], &llms, false);
        assert_eq!(payloads[0].canonical, "Dyson Sphere");
    }

    #[test]
    fn admissibility_filter_counts_as_filtered() {
        let c = consolidator().with_admissibility(Box::new(TitlecaseAdmissibility {
            acronym_min_length: 2,
        }));
        let seeds = vec![seed("gpu clusters", 1.0)];
        let llms = vec![llm("gpu clusters", &[], 0.9)];
        let (payloads, stats) = c.consolidate("gpu clusters", &seeds, &llms, false);
        assert!(payloads.is_empty());
        assert_eq!(stats.seed_filtered, 1);
        assert_eq!(stats.llm_filtered, 1);
    }

    #[test]
    fn raw_payload_shapes() {
        let c = consolidator();
        let payload = serde_json::json!({ "terms": [{ "canonical": "Acme", "classes": ["ORG"], "priority": 0.9 }] });
        let (payloads, _) = c.consolidate_value("Acme", &[], Some(&payload), false);
        assert_eq!(payloads.len(), 1);

        let (empty, stats) = c.consolidate_value("Acme", &[], Some(&serde_json::json!(42)), false);
        assert!(empty.is_empty());
        assert!(stats.fallback);
    }

    #[test]
    fn occurrence_count_is_case_insensitive_and_non_overlapping() {
        assert_eq!(count_occurrences("aaaa", "aa"), 2);
        assert_eq!(count_occurrences("gpu and gpu", "GPU"), 2);
        assert_eq!(count_occurrences("gpu", ""), 0);
    }
}
