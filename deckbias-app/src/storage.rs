//! Learned-alias file shared across runs.
//!
//! The file is a JSON object `{canonical: [variant, ...]}`. Every write is a
//! read-modify-write under one in-process lock, so batch workers sharing a
//! store never lose each other's suggestions.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use deckbias_core::verification::{merge_suggestions, AliasSuggestions};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{info, warn};

#[derive(Debug)]
pub struct AliasStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AliasStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents. Missing or blank files are empty; entries that are
    /// not string lists are skipped with a warning.
    pub fn load(&self) -> Result<AliasSuggestions> {
        let _guard = self.lock.lock();
        read_alias_file(&self.path)
    }

    /// Merge `suggestions` into the file. Returns how many variants were new.
    pub fn append(&self, suggestions: &AliasSuggestions) -> Result<usize> {
        if suggestions.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock.lock();
        let mut existing = read_alias_file(&self.path)?;
        let added = merge_suggestions(&mut existing, suggestions);
        write_json(&self.path, &existing)?;
        info!(
            path = %self.path.display(),
            canonicals = suggestions.len(),
            added,
            "learned aliases appended"
        );
        Ok(added)
    }

    /// Fold learned aliases into `config_path`'s `ocr_aliases`, creating the
    /// file if needed. Variants equal to their canonical are skipped.
    /// Returns how many canonical entries were merged.
    pub fn merge_into_config(&self, config_path: &Path) -> Result<usize> {
        let learned = self.load()?;
        if learned.is_empty() {
            info!(path = %self.path.display(), "no aliases to merge");
            return Ok(0);
        }

        let mut config = match fs::read_to_string(config_path) {
            Ok(raw) if !raw.trim().is_empty() => serde_json::from_str::<Value>(&raw)
                .with_context(|| format!("parse config {}", config_path.display()))?,
            Ok(_) => Value::Object(Map::new()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Value::Object(Map::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("read config {}", config_path.display()))
            }
        };
        let Some(root) = config.as_object_mut() else {
            anyhow::bail!("config {} is not a JSON object", config_path.display());
        };

        let mut aliases = root
            .get("ocr_aliases")
            .map(alias_map_from_value)
            .unwrap_or_default();
        for (canonical, variants) in &learned {
            let bucket = aliases.entry(canonical.clone()).or_default();
            for variant in variants {
                let variant = variant.trim();
                if variant.is_empty()
                    || variant.to_lowercase() == canonical.to_lowercase()
                    || bucket.iter().any(|v| v == variant)
                {
                    continue;
                }
                bucket.push(variant.to_string());
            }
            bucket.sort();
        }
        root.insert("ocr_aliases".into(), serde_json::to_value(&aliases)?);

        write_json(config_path, &config)?;
        info!(
            config = %config_path.display(),
            merged = learned.len(),
            "learned aliases merged into config"
        );
        Ok(learned.len())
    }
}

fn read_alias_file(path: &Path) -> Result<AliasSuggestions> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AliasSuggestions::new()),
        Err(e) => return Err(e).with_context(|| format!("read alias file {}", path.display())),
    };
    if raw.trim().is_empty() {
        return Ok(AliasSuggestions::new());
    }
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("parse alias file {}", path.display()))?;
    if !value.is_object() {
        warn!(path = %path.display(), "alias file is not a JSON object; ignoring contents");
        return Ok(AliasSuggestions::new());
    }
    Ok(alias_map_from_value(&value))
}

fn alias_map_from_value(value: &Value) -> AliasSuggestions {
    let Some(obj) = value.as_object() else {
        return AliasSuggestions::new();
    };
    let mut out = AliasSuggestions::new();
    for (canonical, variants) in obj {
        let Some(items) = variants.as_array() else {
            warn!(canonical = %canonical, "alias entry is not a list; skipping");
            continue;
        };
        let mut list: Vec<String> = items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        list.sort();
        list.dedup();
        out.insert(canonical.clone(), list);
    }
    out
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))
}
