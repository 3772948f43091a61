//! Merged term records and their confidence score.
//!
//! ```text
//! score = clamp01(0.4·priority + 0.3·min(frequency/5, 1) + 0.3·present)
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Priority of a freshly created record. Contributions only raise it, so a
/// merged record carries the max over its contributions.
pub const INITIAL_RECORD_PRIORITY: f64 = 0.0;

/// Occurrence count at which the frequency term saturates.
pub const FREQUENCY_SATURATION: f64 = 5.0;

/// Where a record's evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "seed")]
    Seed,
    #[serde(rename = "llm")]
    Llm,
    #[serde(rename = "seed+llm")]
    SeedLlm,
}

impl Source {
    /// Provenance after an LLM contribution lands on this record.
    pub fn with_llm(self) -> Self {
        match self {
            Source::Seed | Source::SeedLlm => Source::SeedLlm,
            Source::Llm => Source::Llm,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Seed => "seed",
            Source::Llm => "llm",
            Source::SeedLlm => "seed+llm",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One term being merged, keyed by its lowercased canonical.
#[derive(Debug, Clone, PartialEq)]
pub struct TermRecord {
    pub canonical: String,
    pub variants: BTreeSet<String>,
    pub classes: BTreeSet<String>,
    pub source: Source,
    pub priority: f64,
    pub present_in_deck: bool,
    pub frequency: u64,
    pub notes: String,
}

impl TermRecord {
    pub fn new(canonical: impl Into<String>, source: Source) -> Self {
        Self {
            canonical: canonical.into(),
            variants: BTreeSet::new(),
            classes: BTreeSet::new(),
            source,
            priority: INITIAL_RECORD_PRIORITY,
            present_in_deck: false,
            frequency: 0,
            notes: String::new(),
        }
    }

    /// Unrounded confidence in `[0, 1]`.
    pub fn score(&self) -> f64 {
        let freq = (self.frequency as f64 / FREQUENCY_SATURATION).min(1.0);
        let present = if self.present_in_deck { 1.0 } else { 0.0 };
        let raw = 0.4 * self.priority + 0.3 * freq + 0.3 * present;
        if raw.is_nan() {
            return 0.0;
        }
        raw.clamp(0.0, 1.0)
    }

    pub fn to_payload(&self) -> TermPayload {
        TermPayload {
            canonical: self.canonical.clone(),
            variants: self.variants.iter().cloned().collect(),
            classes: self.classes.iter().cloned().collect(),
            source: self.source,
            present_in_deck: self.present_in_deck,
            frequency: self.frequency,
            priority: round3(self.priority),
            score: round3(self.score()),
            notes: self.notes.clone(),
        }
    }
}

/// Serialized form of a consolidated term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermPayload {
    pub canonical: String,
    #[serde(default)]
    pub variants: Vec<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    pub source: Source,
    pub present_in_deck: bool,
    pub frequency: u64,
    pub priority: f64,
    pub score: f64,
    #[serde(default)]
    pub notes: String,
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn score_weights_priority_frequency_presence() {
        let mut rec = TermRecord::new("Dyson Sphere", Source::Llm);
        rec.priority = 0.9;
        rec.frequency = 2;
        rec.present_in_deck = true;
        assert_relative_eq!(rec.score(), 0.36 + 0.12 + 0.3, epsilon = 1e-12);
    }

    #[test]
    fn new_record_has_no_priority_of_its_own() {
        let rec = TermRecord::new("Priya Raman", Source::Llm);
        assert_relative_eq!(rec.priority, 0.0);
        assert_relative_eq!(rec.score(), 0.0);
    }

    #[test]
    fn frequency_saturates_at_five() {
        let mut rec = TermRecord::new("GPU", Source::Seed);
        rec.priority = 1.0;
        rec.present_in_deck = true;
        rec.frequency = 50;
        assert_relative_eq!(rec.score(), 1.0);
    }

    #[test]
    fn payload_rounds_to_three_places() {
        let mut rec = TermRecord::new("Acme", Source::Llm);
        rec.priority = 0.123_456;
        let payload = rec.to_payload();
        assert_relative_eq!(payload.priority, 0.123);
        assert_relative_eq!(payload.score, round3(0.4 * 0.123_456));
    }

    #[test]
    fn source_escalates_and_never_regresses() {
        assert_eq!(Source::Seed.with_llm(), Source::SeedLlm);
        assert_eq!(Source::SeedLlm.with_llm(), Source::SeedLlm);
        assert_eq!(Source::Llm.with_llm(), Source::Llm);
        assert_eq!(
            serde_json::to_string(&Source::SeedLlm).unwrap(),
            "\"seed+llm\""
        );
    }
}
