//! Pluggable check on whether a term may enter the output at all.
//!
//! Applied after the allow-filter in consolidation. The default admits
//! everything; `TitlecaseAdmissibility` keeps only proper-noun or acronym
//! looking terms.

use crate::config::{AdmissibilityMode, BiasConfig};

pub trait TermAdmissibility: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn admits(&self, term: &str) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl TermAdmissibility for AdmitAll {
    fn name(&self) -> &'static str {
        "none"
    }

    fn admits(&self, _term: &str) -> bool {
        true
    }
}

/// Every whitespace token must be an uppercase acronym of at least
/// `acronym_min_length` characters, or start uppercase with a lowercase
/// letter somewhere after it.
#[derive(Debug, Clone, Copy)]
pub struct TitlecaseAdmissibility {
    pub acronym_min_length: usize,
}

impl TitlecaseAdmissibility {
    fn token_ok(&self, token: &str) -> bool {
        let letters: Vec<char> = token.chars().filter(|c| c.is_alphabetic()).collect();
        let Some(first) = letters.first() else {
            return false;
        };
        let is_acronym = letters.iter().all(|c| c.is_uppercase())
            && token.chars().filter(|c| c.is_alphanumeric()).count() >= self.acronym_min_length;
        let is_titlecase = first.is_uppercase() && letters[1..].iter().any(|c| c.is_lowercase());
        is_acronym || is_titlecase
    }
}

impl TermAdmissibility for TitlecaseAdmissibility {
    fn name(&self) -> &'static str {
        "titlecase"
    }

    fn admits(&self, term: &str) -> bool {
        let mut tokens = term.split_whitespace().peekable();
        tokens.peek().is_some() && tokens.all(|t| self.token_ok(t))
    }
}

/// The filter selected by `config.admissibility`.
pub fn from_config(config: &BiasConfig) -> Box<dyn TermAdmissibility> {
    match config.admissibility {
        AdmissibilityMode::None => Box::new(AdmitAll),
        AdmissibilityMode::Titlecase => Box::new(TitlecaseAdmissibility {
            acronym_min_length: config.acronym_min_length,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_all_admits_anything() {
        assert!(AdmitAll.admits("lowercase words"));
    }

    #[test]
    fn titlecase_keeps_names_and_acronyms() {
        let f = TitlecaseAdmissibility { acronym_min_length: 2 };
        assert!(f.admits("Dyson Sphere"));
        assert!(f.admits("NVIDIA"));
        assert!(f.admits("OpenAI"));
        assert!(f.admits("GPU-as-a-Service"));
        assert!(!f.admits("gpu clusters"));
        assert!(!f.admits("A"));
        assert!(!f.admits("Dyson sphere"));
        assert!(!f.admits("   "));
    }

    #[test]
    fn config_selects_filter() {
        let mut cfg = BiasConfig::default();
        assert!(from_config(&cfg).admits("anything"));
        cfg.admissibility = AdmissibilityMode::Titlecase;
        assert!(!from_config(&cfg).admits("anything"));
    }
}
