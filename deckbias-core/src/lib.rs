//! # deckbias-core
//!
//! Builds speech-recognition vocabulary bias lists from presentation decks.
//!
//! ## Architecture
//!
//! ```text
//! deck ─► DeckReader ─► normalized text ─► SeedMiner ─► seed terms ─┐
//!                              │                                    ├─► Consolidator ─► scored terms
//!                              └──────────── LLM term payload ──────┘
//! ```
//!
//! All configuration lives in one `BiasConfig`, built at startup and passed by
//! reference into each stage. Malformed seed or LLM input never fails a run;
//! it simply contributes nothing.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod extraction;
pub mod ingest;
pub mod mining;
pub mod pipeline;
pub mod verification;

// Convenience re-exports for downstream crates
pub use config::{load_config, AdmissibilityMode, BiasConfig};
pub use error::{DeckBiasError, Result};
pub use extraction::{normalize_text, DeckReader, PlainTextExtractor, TextExtractor};
pub use ingest::{parse_json_lenient, parse_llm_terms, parse_seeds, LlmTerm, SeedTerm};
pub use mining::{FilterStats, SeedMiner};
pub use pipeline::{top_terms_by_class, BiasPipeline, ClassTerms, PipelineOutput};
pub use verification::{
    assess_seed_quality, collect_alias_suggestions, AliasCanonicalizer, AliasSuggestions,
    ConsolidationStats, Consolidator, Source, TermAdmissibility, TermPayload, TermRecord,
};
