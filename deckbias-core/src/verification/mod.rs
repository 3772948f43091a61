//! Verification: canonicalize, assess seeds, consolidate, score, learn.

pub mod admissibility;
pub mod alias;
pub mod learning;
pub mod matcher;
pub mod quality;
pub mod scorer;

pub use admissibility::{AdmitAll, TermAdmissibility, TitlecaseAdmissibility};
pub use alias::AliasCanonicalizer;
pub use learning::{collect_alias_suggestions, merge_suggestions, AliasSuggestions};
pub use matcher::{ConsolidationStats, Consolidator};
pub use quality::{assess_seed_quality, SeedQualityStats};
pub use scorer::{Source, TermPayload, TermRecord};
