//! Pipeline configuration.
//!
//! `BiasConfig` is constructed once at process start (defaults, then an
//! optional JSON file, then a per-deck override block) and passed by reference
//! into every component. Nothing in the crate reads configuration from globals.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{DeckBiasError, Result};

/// One regex rewrite applied to raw deck text before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrRule {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

/// Which term admissibility filter the consolidator consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissibilityMode {
    /// Every term that passes the allow-filter is admissible.
    #[default]
    None,
    /// Terms must look like proper nouns or acronyms.
    Titlecase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasConfig {
    pub stop_words: BTreeSet<String>,
    pub deny_patterns: Vec<String>,
    pub deny_exact: BTreeSet<String>,
    pub ocr_aliases: BTreeMap<String, Vec<String>>,
    pub ocr_normalizations: Vec<OcrRule>,
    /// Run OCR cleanup (rules, then alias replacement) on extracted text.
    pub auto_ocr: bool,
    pub min_term_length: usize,
    pub max_term_length: usize,
    pub high_value_classes: BTreeSet<String>,
    /// Classes that bypass the LLM priority gate.
    pub priority_exempt_classes: BTreeSet<String>,
    pub use_llm_priority_threshold: bool,
    pub llm_priority_threshold: f64,
    pub use_section_weighting: bool,
    pub section_keyword_weights: BTreeMap<String, f64>,
    pub default_section_weight: f64,
    pub admissibility: AdmissibilityMode,
    pub acronym_min_length: usize,
    pub class_order: Vec<String>,
    /// Minimum accumulated section weight for a mined seed.
    pub min_freq: f64,
    /// Cap on the number of mined seeds.
    pub max_terms: usize,
    pub deck_overrides: BTreeMap<String, Value>,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            stop_words: [
                "all", "also", "the", "this", "that", "these", "those", "see", "reply", "add",
                "today", "last", "just", "it", "on", "no", "end", "check", "prepare",
                "preparing", "message", "messages", "thread", "linked", "slide",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            deny_patterns: [
                r"^demo[0-9_-]",
                r"^u/",
                r"^t0",
                r"/[A-Z0-9]{6,}",
                r"#[A-Za-z0-9_-]+",
                r"\.py$",
                r"\.js$",
                r"\.ts$",
                r"\.java$",
                r"\.rb$",
                r"\(\)",
                r"/[^\s]{4,}",
                r"^[0-9]{1,2}:[0-9]{2}$",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            deny_exact: BTreeSet::new(),
            ocr_aliases: BTreeMap::from([
                (
                    "Dyson Sphere".to_string(),
                    vec!["Dyson Spher".to_string(), "Dyson Sphere Al".to_string()],
                ),
                ("Liam Nguyen".to_string(), vec!["Liam Nguyn".to_string()]),
                ("AI".to_string(), vec!["Al".to_string()]),
            ]),
            ocr_normalizations: vec![
                OcrRule {
                    pattern: r"\b([A-Z][a-z]+)\s+Al\b".into(),
                    replacement: "${1} AI".into(),
                },
                OcrRule {
                    pattern: r"\bAl\s+([A-Z])".into(),
                    replacement: "AI ${1}".into(),
                },
            ],
            auto_ocr: true,
            min_term_length: 2,
            max_term_length: 50,
            high_value_classes: ["PERSON", "ORG", "PRODUCT", "TECH"]
                .into_iter()
                .map(String::from)
                .collect(),
            priority_exempt_classes: ["PERSON", "ORG"].into_iter().map(String::from).collect(),
            use_llm_priority_threshold: true,
            llm_priority_threshold: 0.75,
            use_section_weighting: true,
            section_keyword_weights: [
                ("team", 2.0),
                ("founder", 2.0),
                ("leadership", 2.0),
                ("product", 1.5),
                ("solution", 1.3),
                ("benchmark", 1.3),
                ("customer", 1.3),
                ("partner", 1.2),
                ("confidential", 0.3),
                ("copyright", 0.1),
                ("footer", 0.3),
            ]
            .into_iter()
            .map(|(k, w)| (k.to_string(), w))
            .collect(),
            default_section_weight: 1.0,
            admissibility: AdmissibilityMode::None,
            acronym_min_length: 2,
            class_order: ["PERSON", "ORG", "PRODUCT", "TECH"]
                .into_iter()
                .map(String::from)
                .collect(),
            min_freq: 1.0,
            max_terms: 500,
            deck_overrides: BTreeMap::new(),
        }
    }
}

impl BiasConfig {
    /// Clamp numeric options and canonicalise the casing of set-valued ones.
    ///
    /// Lookups elsewhere assume stop words and exact denials are lowercase and
    /// class tags are uppercase.
    pub fn normalize(&mut self) {
        self.stop_words = lowercase_set(&self.stop_words);
        self.deny_exact = lowercase_set(&self.deny_exact);
        self.high_value_classes = uppercase_set(&self.high_value_classes);
        self.priority_exempt_classes = uppercase_set(&self.priority_exempt_classes);
        self.class_order = self
            .class_order
            .iter()
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .collect();
        self.deny_patterns.retain(|p| !p.trim().is_empty());
        self.ocr_normalizations.retain(|r| !r.pattern.is_empty());
        self.section_keyword_weights = self
            .section_keyword_weights
            .iter()
            .map(|(k, w)| (k.trim().to_lowercase(), w.max(0.0)))
            .filter(|(k, _)| !k.is_empty())
            .collect();

        // A zero minimum would let empty strings through to presence counting.
        self.min_term_length = self.min_term_length.max(1);
        self.max_term_length = self.max_term_length.max(self.min_term_length);
        self.llm_priority_threshold = self.llm_priority_threshold.clamp(0.0, 1.0);
        if !self.default_section_weight.is_finite() || self.default_section_weight <= 0.0 {
            self.default_section_weight = 1.0;
        }
        self.acronym_min_length = self.acronym_min_length.max(1);
        self.min_freq = self.min_freq.max(0.0);
    }

    /// Build a config from a JSON value, deep-merging it over the defaults.
    pub fn from_json_value(overrides: &Value) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;
        if !overrides.is_object() {
            return Err(DeckBiasError::InvalidConfig(
                "configuration root must be a JSON object".into(),
            ));
        }
        deep_merge(&mut merged, overrides);
        let mut cfg: Self = serde_json::from_value(merged)
            .map_err(|e| DeckBiasError::InvalidConfig(e.to_string()))?;
        cfg.normalize();
        Ok(cfg)
    }

    /// Apply the `deck_overrides` block registered for `deck_id`, if any.
    pub fn with_deck_overrides(self, deck_id: &str) -> Result<Self> {
        let Some(overrides) = self.deck_overrides.get(deck_id).cloned() else {
            return Ok(self);
        };
        if !overrides.is_object() {
            debug!(deck_id, "deck override is not an object, ignoring");
            return Ok(self);
        }
        let mut merged = serde_json::to_value(&self)?;
        deep_merge(&mut merged, &overrides);
        let mut cfg: Self = serde_json::from_value(merged)
            .map_err(|e| DeckBiasError::InvalidConfig(e.to_string()))?;
        cfg.normalize();
        info!(deck_id, "deck overrides applied");
        Ok(cfg)
    }
}

/// Load configuration from `path` (when it exists), then apply overrides for
/// `deck_id`. A missing file yields the defaults; an unreadable or malformed
/// one is an error.
pub fn load_config(path: Option<&Path>, deck_id: Option<&str>) -> Result<BiasConfig> {
    let mut cfg = match path {
        Some(p) if p.exists() => {
            let raw = fs::read_to_string(p)?;
            let value: Value = if raw.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&raw)
                    .map_err(|e| DeckBiasError::InvalidConfig(format!("{}: {e}", p.display())))?
            };
            info!(path = %p.display(), "configuration file loaded");
            BiasConfig::from_json_value(&value)?
        }
        Some(p) => {
            debug!(path = %p.display(), "configuration file not found, using defaults");
            BiasConfig::default()
        }
        None => BiasConfig::default(),
    };
    cfg.normalize();
    match deck_id {
        Some(id) if !id.trim().is_empty() => cfg.with_deck_overrides(id.trim()),
        _ => Ok(cfg),
    }
}

/// Nested objects merge key-wise; every other value replaces the base.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

fn lowercase_set(raw: &BTreeSet<String>) -> BTreeSet<String> {
    raw.iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn uppercase_set(raw: &BTreeSet<String>) -> BTreeSet<String> {
    raw.iter()
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}
