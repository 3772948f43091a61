//! OCR alias canonicalization.

use std::collections::{HashMap, HashSet};

use crate::config::BiasConfig;

use crate::mining::normalize_term;

/// Maps known OCR variants (case-insensitively) to their canonical spelling.
///
/// A variant that is itself some canonical (case-insensitively) is ignored,
/// so canonical spellings are fixed points and lookups never chain.
#[derive(Debug, Clone, Default)]
pub struct AliasCanonicalizer {
    by_variant: HashMap<String, String>,
}

impl AliasCanonicalizer {
    pub fn new(config: &BiasConfig) -> Self {
        let canonicals: HashSet<String> = config
            .ocr_aliases
            .keys()
            .map(|c| normalize_term(c).to_lowercase())
            .collect();

        let mut by_variant = HashMap::new();
        for (canonical, variants) in &config.ocr_aliases {
            let canonical = normalize_term(canonical);
            if canonical.is_empty() {
                continue;
            }
            for variant in variants {
                let key = normalize_term(variant).to_lowercase();
                if key.is_empty() || canonicals.contains(&key) {
                    continue;
                }
                by_variant.entry(key).or_insert_with(|| canonical.clone());
            }
        }
        Self { by_variant }
    }

    /// The canonical spelling for a registered variant; anything else is
    /// returned unchanged.
    pub fn canonicalize(&self, term: &str) -> String {
        self.by_variant
            .get(&term.to_lowercase())
            .cloned()
            .unwrap_or_else(|| term.to_string())
    }

    /// Whitespace-normalize, then canonicalize.
    pub fn resolve(&self, term: &str) -> String {
        self.canonicalize(&normalize_term(term))
    }

    pub fn is_known_variant(&self, term: &str) -> bool {
        self.by_variant.contains_key(&term.to_lowercase())
    }
}
