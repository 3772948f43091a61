//! `BiasPipeline`: single-deck orchestration.
//!
//! ## Stages
//!
//! ```text
//! deck file ──► DeckReader (extract, OCR cleanup, normalize)
//!                   │
//!                   ▼
//!               SeedMiner ──► seeds + FilterStats
//!                   │
//!  LLM payload ──►  ▼
//!               Consolidator ──► TermPayloads + ConsolidationStats
//!                   │
//!                   ▼
//!       alias suggestions, top terms per class
//! ```
//!
//! Invoking the LLM is the host's business: the pipeline only consumes its
//! JSON output, and runs deterministic-only when there is none.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::config::BiasConfig;
use crate::error::Result;
use crate::extraction::{DeckReader, TextExtractor};
use crate::ingest::SeedTerm;
use crate::mining::{FilterStats, SeedMiner};
use crate::verification::{
    collect_alias_suggestions, AliasSuggestions, ConsolidationStats, Consolidator,
    TermAdmissibility, TermPayload,
};

/// Terms listed per class in the run summary.
pub const TOP_TERMS_PER_CLASS: usize = 5;

/// Highest-scoring canonicals carrying one class tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassTerms {
    pub class: String,
    pub terms: Vec<String>,
}

/// Everything one pipeline run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub deck_text: String,
    pub seeds: Vec<SeedTerm>,
    pub mine_stats: FilterStats,
    pub terms: Vec<TermPayload>,
    pub verify_stats: ConsolidationStats,
    pub alias_suggestions: AliasSuggestions,
    pub top_terms: Vec<ClassTerms>,
}

pub struct BiasPipeline {
    config: BiasConfig,
    reader: DeckReader,
    miner: SeedMiner,
    consolidator: Consolidator,
    allow_llm_aliases: bool,
}

impl BiasPipeline {
    /// Compile every stage from `config`.
    ///
    /// # Errors
    /// `DeckBiasError::InvalidPattern` if a deny pattern or OCR rule does not
    /// compile.
    pub fn new(config: BiasConfig) -> Result<Self> {
        Ok(Self {
            reader: DeckReader::new(&config)?,
            miner: SeedMiner::new(&config)?,
            consolidator: Consolidator::new(&config)?,
            allow_llm_aliases: false,
            config,
        })
    }

    /// Keep LLM terms that cannot be found in the deck text.
    pub fn allow_llm_aliases(mut self, allow: bool) -> Self {
        self.allow_llm_aliases = allow;
        self
    }

    pub fn with_extractor<E: TextExtractor + 'static>(mut self, extractor: E) -> Self {
        self.reader = self.reader.with_extractor(extractor);
        self
    }

    pub fn with_admissibility(mut self, filter: Box<dyn TermAdmissibility>) -> Self {
        self.consolidator = self.consolidator.with_admissibility(filter);
        self
    }

    pub fn config(&self) -> &BiasConfig {
        &self.config
    }

    pub fn miner(&self) -> &SeedMiner {
        &self.miner
    }

    pub fn consolidator(&self) -> &Consolidator {
        &self.consolidator
    }

    /// Extract and normalize the deck at `path`.
    pub fn read_deck(&self, path: &Path) -> Result<String> {
        self.reader.read(path)
    }

    /// Read the deck at `path`, then `run` over its text.
    pub fn run_file(&self, path: &Path, llm_payload: Option<&Value>) -> Result<PipelineOutput> {
        let text = self.read_deck(path)?;
        Ok(self.run_normalized(text, llm_payload))
    }

    /// Mine, consolidate and summarize raw deck text.
    pub fn run(&self, deck_text: &str, llm_payload: Option<&Value>) -> PipelineOutput {
        self.run_normalized(self.reader.clean(deck_text), llm_payload)
    }

    fn run_normalized(&self, deck_text: String, llm_payload: Option<&Value>) -> PipelineOutput {
        info!(chars = deck_text.chars().count(), "mining deterministic seeds");
        let (seeds, mine_stats) = self.miner.mine(&deck_text);

        info!(
            seeds = seeds.len(),
            llm_payload = llm_payload.is_some(),
            "verifying and consolidating terms"
        );
        let (terms, verify_stats) = self.consolidator.consolidate_value(
            &deck_text,
            &seeds,
            llm_payload,
            self.allow_llm_aliases,
        );

        let alias_suggestions = collect_alias_suggestions(&terms, self.consolidator.aliases());
        let top_terms = top_terms_by_class(&terms, &self.config.class_order, TOP_TERMS_PER_CLASS);
        info!(
            verified = terms.len(),
            learned_aliases = alias_suggestions.len(),
            "pipeline complete"
        );

        PipelineOutput {
            deck_text,
            seeds,
            mine_stats,
            terms,
            verify_stats,
            alias_suggestions,
            top_terms,
        }
    }
}

impl std::fmt::Debug for BiasPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BiasPipeline")
            .field("reader", &self.reader)
            .field("consolidator", &self.consolidator)
            .field("allow_llm_aliases", &self.allow_llm_aliases)
            .finish_non_exhaustive()
    }
}

/// Up to `per_class` canonicals per class, highest score first.
///
/// Classes in `class_order` always appear (possibly empty) and come first;
/// any other class follows in the order it is first met.
pub fn top_terms_by_class(
    terms: &[TermPayload],
    class_order: &[String],
    per_class: usize,
) -> Vec<ClassTerms> {
    let mut order: Vec<String> = class_order.to_vec();
    let mut buckets: BTreeMap<String, Vec<String>> = class_order
        .iter()
        .map(|c| (c.clone(), Vec::new()))
        .collect();

    let mut ranked: Vec<&TermPayload> = terms.iter().collect();
    // Stable: equal scores keep their consolidation order.
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    for term in ranked {
        let canonical = term.canonical.trim();
        if canonical.is_empty() {
            continue;
        }
        for class in &term.classes {
            let bucket = buckets.entry(class.clone()).or_insert_with(|| {
                order.push(class.clone());
                Vec::new()
            });
            if bucket.len() < per_class {
                bucket.push(canonical.to_string());
            }
        }
    }

    order
        .into_iter()
        .map(|class| {
            let terms = buckets.remove(&class).unwrap_or_default();
            ClassTerms { class, terms }
        })
        .collect()
}
