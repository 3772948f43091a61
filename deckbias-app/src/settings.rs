//! Host-side settings: where configuration, outputs and learned aliases live.

use std::path::{Path, PathBuf};

/// Environment override for the configuration file.
pub const CONFIG_FILE_ENV: &str = "BIAS_CONFIG_FILE";
/// Environment override for the deck id used to pick `deck_overrides`.
pub const DECK_ID_ENV: &str = "BIAS_DECK_ID";

pub const LLM_CANDIDATES_FILE: &str = "llm_candidates.json";
pub const LEARNED_ALIASES_FILE: &str = "aliases_learned.json";

/// Per-user data directory for deckbias.
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Deckbias")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("deckbias")
    }
}

pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.json")
}

pub fn default_learned_aliases_path() -> PathBuf {
    default_data_dir().join(LEARNED_ALIASES_FILE)
}

/// Explicit path (flag or `BIAS_CONFIG_FILE`, resolved by clap) or the
/// per-user default.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path)
}

/// Explicit deck id, else the deck file stem.
pub fn resolve_deck_id(explicit: Option<&str>, deck: Option<&Path>) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .or_else(|| {
            deck.and_then(|p| p.file_stem())
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
}

/// `<root>/<deck stem>`, the per-deck output directory.
pub fn deck_output_dir(root: &Path, deck: &Path) -> PathBuf {
    let stem = deck
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("deck");
    root.join(stem)
}
