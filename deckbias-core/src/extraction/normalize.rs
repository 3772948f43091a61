//! Text normalization shared by every extractor.
//!
//! ## Output contract
//!
//! ```text
//! NFC composed, "\r" → "\n", horizontal whitespace runs → " ",
//! no leading/trailing spaces on a line, no blank lines, trimmed.
//! ```
//!
//! The miner and the consolidator both assume this shape: one logical line
//! per slide text block, newline separated.

use regex::{NoExpand, Regex};
use unicode_normalization::UnicodeNormalization;

use crate::config::BiasConfig;
use crate::error::{DeckBiasError, Result};

/// Normalize Unicode composition and whitespace while keeping line structure.
pub fn normalize_text(text: &str) -> String {
    let composed: String = text.nfc().collect();
    composed
        .replace('\r', "\n")
        .split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compiled OCR cleanup: regex rewrite rules, then alias variant replacement.
#[derive(Debug, Clone)]
pub struct OcrNormalizer {
    rules: Vec<(Regex, String)>,
    aliases: Vec<(Regex, String)>,
}

impl OcrNormalizer {
    pub fn new(config: &BiasConfig) -> Result<Self> {
        let mut rules = Vec::with_capacity(config.ocr_normalizations.len());
        for rule in &config.ocr_normalizations {
            let re = Regex::new(&rule.pattern).map_err(|source| DeckBiasError::InvalidPattern {
                pattern: rule.pattern.clone(),
                source,
            })?;
            rules.push((re, rule.replacement.clone()));
        }

        let mut aliases = Vec::new();
        for (canonical, variants) in &config.ocr_aliases {
            for variant in variants {
                let variant = variant.trim();
                if variant.is_empty() {
                    continue;
                }
                let pattern = format!(r"(?i)\b{}\b", regex::escape(variant));
                let re = Regex::new(&pattern)
                    .map_err(|source| DeckBiasError::InvalidPattern { pattern, source })?;
                aliases.push((re, canonical.clone()));
            }
        }

        Ok(Self { rules, aliases })
    }

    /// Apply every rewrite rule in order, then replace alias variants with
    /// their canonical spelling (whole word, case-insensitive).
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (re, replacement) in &self.rules {
            out = re.replace_all(&out, replacement.as_str()).into_owned();
        }
        for (re, canonical) in &self.aliases {
            out = re.replace_all(&out, NoExpand(canonical)).into_owned();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_spaces_but_keeps_lines() {
        let raw = "  Team   Overview:\r\n\n\tLiam  Nguyen \u{00a0} CEO  \n\n";
        assert_eq!(normalize_text(raw), "Team Overview:\nLiam Nguyen CEO");
    }

    #[test]
    fn composes_decomposed_characters() {
        // "e" + combining acute accent
        let raw = "Caf\u{0065}\u{0301} Partner";
        assert_eq!(normalize_text(raw), "Caf\u{00e9} Partner");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalize_text(" \n\r\n "), "");
    }

    #[test]
    fn default_rules_repair_ai_misreads() {
        let ocr = OcrNormalizer::new(&BiasConfig::default()).unwrap();
        assert_eq!(ocr.apply("Dyson Sphere Al platform"), "Dyson Sphere AI platform");
        assert_eq!(ocr.apply("Al Copilot"), "AI Copilot");
    }

    #[test]
    fn alias_variants_are_replaced_whole_word_only() {
        let ocr = OcrNormalizer::new(&BiasConfig::default()).unwrap();
        assert_eq!(ocr.apply("CEO liam nguyn joined"), "CEO Liam Nguyen joined");
        // "Liam Nguynx" is not a whole-word hit.
        assert_eq!(ocr.apply("Liam Nguynx"), "Liam Nguynx");
    }

    #[test]
    fn invalid_rule_is_reported() {
        let mut cfg = BiasConfig::default();
        cfg.ocr_normalizations.push(crate::config::OcrRule {
            pattern: "([unclosed".into(),
            replacement: String::new(),
        });
        let err = OcrNormalizer::new(&cfg).unwrap_err();
        assert!(matches!(err, DeckBiasError::InvalidPattern { .. }));
    }
}
