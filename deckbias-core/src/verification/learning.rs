//! Alias suggestions harvested from consolidated terms.

use std::collections::{BTreeMap, BTreeSet};

use super::alias::AliasCanonicalizer;
use super::scorer::TermPayload;

/// Learned `{canonical: [variants]}` map, sorted on both levels.
pub type AliasSuggestions = BTreeMap<String, Vec<String>>;

/// Variants worth proposing as new OCR aliases: anything that differs from
/// its canonical (case-insensitively) and is not already a registered alias.
pub fn collect_alias_suggestions(
    payloads: &[TermPayload],
    aliases: &AliasCanonicalizer,
) -> AliasSuggestions {
    let mut grouped: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for payload in payloads {
        let canonical = payload.canonical.trim();
        if canonical.is_empty() {
            continue;
        }
        for variant in &payload.variants {
            let variant = variant.trim();
            if variant.is_empty()
                || variant.to_lowercase() == canonical.to_lowercase()
                || aliases.is_known_variant(variant)
            {
                continue;
            }
            grouped
                .entry(canonical.to_string())
                .or_default()
                .insert(variant.to_string());
        }
    }
    grouped
        .into_iter()
        .map(|(canonical, variants)| (canonical, variants.into_iter().collect()))
        .collect()
}

/// Fold `incoming` into `existing`, keeping each variant list sorted and
/// deduplicated. Returns how many new variants were added.
pub fn merge_suggestions(existing: &mut AliasSuggestions, incoming: &AliasSuggestions) -> usize {
    let mut added = 0;
    for (canonical, variants) in incoming {
        let current = existing.entry(canonical.clone()).or_default();
        let mut set: BTreeSet<String> = current.drain(..).collect();
        for v in variants {
            if set.insert(v.clone()) {
                added += 1;
            }
        }
        *current = set.into_iter().collect();
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BiasConfig;
    use crate::verification::scorer::Source;

    fn payload(canonical: &str, variants: &[&str]) -> TermPayload {
        TermPayload {
            canonical: canonical.into(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
            classes: Vec::new(),
            source: Source::Llm,
            present_in_deck: true,
            frequency: 1,
            priority: 0.9,
            score: 0.9,
            notes: String::new(),
        }
    }

    #[test]
    fn skips_known_and_identical_variants() {
        let aliases = AliasCanonicalizer::new(&BiasConfig::default());
        let payloads = vec![
            payload("Dyson Sphere", &["Dyson Spher", "DYSON SPHERE", "Dyson-Sphere", " DS "]),
            payload("Acme", &[]),
        ];
        let suggestions = collect_alias_suggestions(&payloads, &aliases);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions["Dyson Sphere"], vec!["DS", "Dyson-Sphere"]);
    }

    #[test]
    fn merge_counts_only_new_variants() {
        let mut existing = AliasSuggestions::from([("Acme".to_string(), vec!["ACME Co".to_string()])]);
        let incoming = AliasSuggestions::from([
            ("Acme".to_string(), vec!["ACME Co".to_string(), "Acme Inc".to_string()]),
            ("Globex".to_string(), vec!["Globx".to_string()]),
        ]);
        assert_eq!(merge_suggestions(&mut existing, &incoming), 2);
        assert_eq!(existing["Acme"], vec!["ACME Co", "Acme Inc"]);
        assert_eq!(existing["Globex"], vec!["Globx"]);
    }
}
