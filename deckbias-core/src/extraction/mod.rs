//! Deck text extraction boundary.
//!
//! The `TextExtractor` trait decouples the pipeline from any specific reader
//! (plain text, PDF text layer, PPTX XML, OCR). Only plain text ships with
//! the core; binary formats are supplied by the host and registered on a
//! `DeckReader`. Every extractor's output goes through OCR cleanup and
//! `normalize_text` before the miner sees it.

pub mod normalize;

pub use normalize::{normalize_text, OcrNormalizer};

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::config::BiasConfig;
use crate::error::{DeckBiasError, Result};

/// Contract for deck readers.
pub trait TextExtractor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this extractor handles the lowercase file extension (no dot).
    fn supports(&self, extension: &str) -> bool;

    /// Return the raw (un-normalized) text of the deck.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or decoded.
    fn extract(&self, path: &Path) -> Result<String>;
}

/// Reads `.txt` and `.md` decks as UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn supports(&self, extension: &str) -> bool {
        matches!(extension, "txt" | "md")
    }

    fn extract(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }
}

/// Dispatches a deck path to the first extractor that supports its suffix.
pub struct DeckReader {
    extractors: Vec<Box<dyn TextExtractor>>,
    /// `None` when `auto_ocr` is off.
    ocr: Option<OcrNormalizer>,
}

impl DeckReader {
    /// Reader with only the built-in plain-text extractor.
    pub fn new(config: &BiasConfig) -> Result<Self> {
        Ok(Self {
            extractors: vec![Box::new(PlainTextExtractor)],
            ocr: if config.auto_ocr {
                Some(OcrNormalizer::new(config)?)
            } else {
                None
            },
        })
    }

    /// Register an additional extractor. Later registrations take precedence.
    pub fn with_extractor<E: TextExtractor + 'static>(mut self, extractor: E) -> Self {
        self.extractors.insert(0, Box::new(extractor));
        self
    }

    /// Extract, OCR-clean and normalize the deck at `path`.
    ///
    /// # Errors
    /// - `DeckBiasError::UnsupportedFormat` if no extractor handles the suffix.
    /// - `DeckBiasError::ExtractionFailed` if the extractor yields no text.
    pub fn read(&self, path: &Path) -> Result<String> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let Some(extractor) = self.extractors.iter().find(|e| e.supports(&extension)) else {
            return Err(DeckBiasError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension,
            });
        };

        let raw = extractor.extract(path)?;
        let text = self.clean(&raw);
        if text.is_empty() {
            warn!(extractor = extractor.name(), path = %path.display(), "extractor returned no text");
            return Err(DeckBiasError::ExtractionFailed(format!(
                "{} produced no text for {}",
                extractor.name(),
                path.display()
            )));
        }
        info!(
            extractor = extractor.name(),
            chars = text.chars().count(),
            "deck text extracted"
        );
        Ok(text)
    }

    /// OCR cleanup followed by normalization, for text obtained elsewhere.
    pub fn clean(&self, raw: &str) -> String {
        match &self.ocr {
            Some(ocr) => normalize_text(&ocr.apply(raw)),
            None => normalize_text(raw),
        }
    }
}

impl std::fmt::Debug for DeckReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeckReader")
            .field(
                "extractors",
                &self.extractors.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .field("auto_ocr", &self.ocr.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedExtractor(&'static str);

    impl TextExtractor for FixedExtractor {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn supports(&self, extension: &str) -> bool {
            extension == "pdf"
        }

        fn extract(&self, _path: &Path) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn unknown_suffix_is_unsupported() {
        let reader = DeckReader::new(&BiasConfig::default()).unwrap();
        let err = reader.read(Path::new("deck.pptx")).unwrap_err();
        match err {
            DeckBiasError::UnsupportedFormat { extension, .. } => assert_eq!(extension, "pptx"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn registered_extractor_output_is_normalized() {
        let reader = DeckReader::new(&BiasConfig::default())
            .unwrap()
            .with_extractor(FixedExtractor("  Dyson   Sphere Al \r\n Team "));
        let text = reader.read(Path::new("deck.PDF")).unwrap();
        assert_eq!(text, "Dyson Sphere AI\nTeam");
    }

    #[test]
    fn blank_extraction_fails() {
        let reader = DeckReader::new(&BiasConfig::default())
            .unwrap()
            .with_extractor(FixedExtractor(" \n "));
        assert!(matches!(
            reader.read(Path::new("deck.pdf")),
            Err(DeckBiasError::ExtractionFailed(_))
        ));
    }

    #[test]
    fn ocr_cleanup_can_be_disabled() {
        let mut cfg = BiasConfig::default();
        cfg.auto_ocr = false;
        let reader = DeckReader::new(&cfg).unwrap();
        assert_eq!(reader.clean("Liam  Nguyn"), "Liam Nguyn");
    }

    #[test]
    fn plain_text_files_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.txt");
        fs::write(&path, "Liam Nguyn\nFounder").unwrap();
        let reader = DeckReader::new(&BiasConfig::default()).unwrap();
        assert_eq!(reader.read(&path).unwrap(), "Liam Nguyen\nFounder");
    }
}
