//! Subcommand handlers.
//!
//! Each handler owns its clap arguments, loads configuration through
//! `GlobalOpts`, and reports failures as `anyhow` errors with file context.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use crossbeam_channel::unbounded;
use deckbias_core::{
    load_config, parse_json_lenient, parse_seeds, BiasConfig, BiasPipeline, ClassTerms,
    ConsolidationStats, Consolidator, DeckReader, FilterStats, SeedMiner,
};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{error, info, info_span, warn};

use crate::settings::{
    deck_output_dir, default_learned_aliases_path, resolve_config_path, resolve_deck_id,
    CONFIG_FILE_ENV, DECK_ID_ENV, LEARNED_ALIASES_FILE, LLM_CANDIDATES_FILE,
};
use crate::storage::AliasStore;

pub const DECK_TEXT_FILE: &str = "deck_text.txt";
pub const SEEDS_FILE: &str = "seeds.json";
pub const MINE_STATS_FILE: &str = "mine_terms_stats.json";
pub const VERIFIED_TERMS_FILE: &str = "verified_terms.json";
pub const VERIFY_STATS_FILE: &str = "verify_stats.json";
pub const RUN_MANIFEST_FILE: &str = "run_manifest.json";
pub const BATCH_SUMMARY_FILE: &str = "batch_summary.json";

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// JSON configuration file (defaults to the per-user config)
    #[arg(long, global = true, env = CONFIG_FILE_ENV, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Deck id used to select a `deck_overrides` block
    #[arg(long, global = true, env = DECK_ID_ENV)]
    pub deck_id: Option<String>,
}

impl GlobalOpts {
    /// Load configuration for `deck`, applying its overrides.
    pub fn load_config(&self, deck: Option<&Path>) -> Result<BiasConfig> {
        let path = resolve_config_path(self.config.as_deref());
        let deck_id = resolve_deck_id(self.deck_id.as_deref(), deck);
        load_config(Some(&path), deck_id.as_deref())
            .with_context(|| format!("load config {}", path.display()))
    }
}

// ── extract ────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Deck to extract text from
    pub deck: PathBuf,

    /// Where to write the normalized text (defaults to stdout)
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

pub fn extract(global: &GlobalOpts, args: ExtractArgs) -> Result<()> {
    let cfg = global.load_config(Some(&args.deck))?;
    let text = DeckReader::new(&cfg)?
        .read(&args.deck)
        .with_context(|| format!("extract {}", args.deck.display()))?;
    match args.output {
        Some(path) => write_text(&path, &text),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

// ── mine ───────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct MineArgs {
    /// Deck or extracted deck text
    pub deck_text: PathBuf,

    /// Minimum accumulated weight to keep a term
    #[arg(long)]
    pub min_freq: Option<f64>,

    /// Maximum number of seeds to emit
    #[arg(long)]
    pub max_terms: Option<usize>,

    /// Where to write the seeds (defaults to stdout)
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Optional JSON file for filter counters
    #[arg(long, value_name = "FILE")]
    pub stats_file: Option<PathBuf>,
}

pub fn mine(global: &GlobalOpts, args: MineArgs) -> Result<()> {
    let cfg = global.load_config(Some(&args.deck_text))?;
    let text = DeckReader::new(&cfg)?
        .read(&args.deck_text)
        .with_context(|| format!("read {}", args.deck_text.display()))?;

    let miner = SeedMiner::new(&cfg)?.with_limits(
        args.min_freq.unwrap_or(cfg.min_freq),
        args.max_terms.unwrap_or(cfg.max_terms),
    );
    let (seeds, stats) = miner.mine(&text);

    if let Some(path) = &args.stats_file {
        write_json(path, &stats)?;
    }
    emit_json(args.output.as_deref(), &seeds)
}

// ── verify ─────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Normalized deck text
    #[arg(long, value_name = "FILE")]
    pub deck_text: PathBuf,

    /// Deterministic seeds JSON
    #[arg(long, value_name = "FILE")]
    pub seeds: Option<PathBuf>,

    /// LLM candidates JSON
    #[arg(long, value_name = "FILE")]
    pub llm: Option<PathBuf>,

    /// Keep LLM terms that cannot be found in the deck text
    #[arg(long)]
    pub allow_llm_aliases: bool,

    /// Where to write verified terms (defaults to stdout)
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Optional JSON file for consolidation counters
    #[arg(long, value_name = "FILE")]
    pub stats_file: Option<PathBuf>,

    /// Append alias suggestions to this file
    #[arg(long, value_name = "FILE")]
    pub learned_aliases: Option<PathBuf>,
}

pub fn verify(global: &GlobalOpts, args: VerifyArgs) -> Result<()> {
    let cfg = global.load_config(Some(&args.deck_text))?;
    let deck_text = fs::read_to_string(&args.deck_text)
        .with_context(|| format!("read {}", args.deck_text.display()))?;
    let seeds = parse_seeds(read_json_lenient(args.seeds.as_deref())?.as_ref());
    let llm = read_json_lenient(args.llm.as_deref())?;

    let consolidator = Consolidator::new(&cfg)?;
    let (terms, stats) =
        consolidator.consolidate_value(&deck_text, &seeds, llm.as_ref(), args.allow_llm_aliases);

    if let Some(path) = &args.stats_file {
        write_json(path, &stats)?;
    }
    if let Some(path) = args.learned_aliases {
        let suggestions =
            deckbias_core::collect_alias_suggestions(&terms, consolidator.aliases());
        AliasStore::new(path).append(&suggestions)?;
    }
    emit_json(args.output.as_deref(), &terms)
}

// ── run ────────────────────────────────────────────────────────────────────

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Deck to process
    pub deck: PathBuf,

    /// Existing LLM candidates (defaults to `<output-dir>/llm_candidates.json`)
    #[arg(long, value_name = "FILE")]
    pub llm_output: Option<PathBuf>,

    /// Artifact directory (defaults to `out/<deck stem>`)
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Keep LLM terms that cannot be found in the deck text
    #[arg(long)]
    pub allow_llm_aliases: bool,

    /// Also append alias suggestions to this shared file
    #[arg(long, value_name = "FILE")]
    pub learned_aliases: Option<PathBuf>,
}

/// Provenance record written next to a run's artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub deck: String,
    pub deck_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deck_text_sha256: String,
    pub config: String,
    pub llm_candidates: Option<String>,
    pub allow_llm_aliases: bool,
    pub seed_count: usize,
    pub verified_count: usize,
    pub mine_stats: FilterStats,
    pub verify_stats: ConsolidationStats,
    pub learned_aliases_added: usize,
    pub top_terms: Vec<ClassTerms>,
    pub artifacts: Vec<String>,
}

pub fn run(global: &GlobalOpts, args: RunArgs) -> Result<()> {
    let shared = args.learned_aliases.clone().map(AliasStore::new);
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| deck_output_dir(Path::new("out"), &args.deck));
    let manifest = run_deck(global, &args, &output_dir, shared.as_ref())?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

/// Run the pipeline for one deck and write every artifact into `output_dir`.
pub fn run_deck(
    global: &GlobalOpts,
    args: &RunArgs,
    output_dir: &Path,
    shared_aliases: Option<&AliasStore>,
) -> Result<RunManifest> {
    let config_path = resolve_config_path(global.config.as_deref());
    let deck_id = resolve_deck_id(global.deck_id.as_deref(), Some(&args.deck));
    let cfg = global.load_config(Some(&args.deck))?;
    info!(deck = %args.deck.display(), output = %output_dir.display(), "starting run");

    fs::create_dir_all(output_dir)
        .with_context(|| format!("create output dir {}", output_dir.display()))?;

    let llm_path = args
        .llm_output
        .clone()
        .unwrap_or_else(|| output_dir.join(LLM_CANDIDATES_FILE));
    let llm_payload = if llm_path.exists() {
        info!(path = %llm_path.display(), "using existing LLM candidates");
        read_json_lenient(Some(&llm_path))?
    } else {
        if args.llm_output.is_some() {
            warn!(path = %llm_path.display(), "LLM candidates file not found");
        }
        info!("no LLM candidates; running deterministic-only");
        None
    };

    let pipeline = BiasPipeline::new(cfg)?.allow_llm_aliases(args.allow_llm_aliases);
    let out = pipeline
        .run_file(&args.deck, llm_payload.as_ref())
        .with_context(|| format!("process {}", args.deck.display()))?;

    let mut artifacts = Vec::new();
    let mut record = |name: &str| artifacts.push(name.to_string());

    write_text(&output_dir.join(DECK_TEXT_FILE), &out.deck_text)?;
    record(DECK_TEXT_FILE);
    write_json(&output_dir.join(SEEDS_FILE), &out.seeds)?;
    record(SEEDS_FILE);
    write_json(&output_dir.join(MINE_STATS_FILE), &out.mine_stats)?;
    record(MINE_STATS_FILE);
    write_json(&output_dir.join(VERIFIED_TERMS_FILE), &out.terms)?;
    record(VERIFIED_TERMS_FILE);
    write_json(&output_dir.join(VERIFY_STATS_FILE), &out.verify_stats)?;
    record(VERIFY_STATS_FILE);

    let learned_aliases_added =
        AliasStore::new(output_dir.join(LEARNED_ALIASES_FILE)).append(&out.alias_suggestions)?;
    if !out.alias_suggestions.is_empty() {
        record(LEARNED_ALIASES_FILE);
    }
    if let Some(store) = shared_aliases {
        store.append(&out.alias_suggestions)?;
    }
    record(RUN_MANIFEST_FILE);

    let manifest = RunManifest {
        deck: args.deck.display().to_string(),
        deck_id,
        created_at: Utc::now(),
        deck_text_sha256: sha256_hex(&out.deck_text),
        config: config_path.display().to_string(),
        llm_candidates: llm_payload.is_some().then(|| llm_path.display().to_string()),
        allow_llm_aliases: args.allow_llm_aliases,
        seed_count: out.seeds.len(),
        verified_count: out.terms.len(),
        mine_stats: out.mine_stats,
        verify_stats: out.verify_stats,
        learned_aliases_added,
        top_terms: out.top_terms,
        artifacts,
    };
    write_json(&output_dir.join(RUN_MANIFEST_FILE), &manifest)?;
    info!(
        seeds = manifest.seed_count,
        verified = manifest.verified_count,
        "run complete"
    );
    Ok(manifest)
}

// ── batch ──────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Decks to process
    #[arg(required = true)]
    pub decks: Vec<PathBuf>,

    /// Root directory; each deck writes to `<root>/<deck stem>`
    #[arg(long, default_value = "out", value_name = "DIR")]
    pub output_root: PathBuf,

    /// Worker threads (defaults to available parallelism)
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,

    /// Keep LLM terms that cannot be found in the deck text
    #[arg(long)]
    pub allow_llm_aliases: bool,

    /// Shared learned-alias file (defaults to `<root>/aliases_learned.json`)
    #[arg(long, value_name = "FILE")]
    pub learned_aliases: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct BatchEntry {
    pub deck: String,
    pub output_dir: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn batch(global: &GlobalOpts, args: BatchArgs) -> Result<()> {
    let entries = run_batch(global, &args)?;
    let failed = entries.iter().filter(|e| !e.ok).count();
    println!("{}", serde_json::to_string_pretty(&entries)?);
    if failed > 0 {
        anyhow::bail!("{failed} of {} decks failed", entries.len());
    }
    Ok(())
}

/// Process every deck on a pool of worker threads fed from one queue.
///
/// Per-deck failures are reported in the summary rather than aborting the
/// batch. Results are returned in input order.
pub fn run_batch(global: &GlobalOpts, args: &BatchArgs) -> Result<Vec<BatchEntry>> {
    let jobs = args
        .jobs
        .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
        .clamp(1, args.decks.len().max(1));
    let store = AliasStore::new(
        args.learned_aliases
            .clone()
            .unwrap_or_else(|| args.output_root.join(LEARNED_ALIASES_FILE)),
    );
    info!(decks = args.decks.len(), jobs, aliases = %store.path().display(), "starting batch");

    let (job_tx, job_rx) = unbounded::<(usize, PathBuf)>();
    let (result_tx, result_rx) = unbounded::<(usize, BatchEntry)>();
    for (index, deck) in args.decks.iter().enumerate() {
        job_tx
            .send((index, deck.clone()))
            .context("queue batch job")?;
    }
    drop(job_tx);

    std::thread::scope(|scope| {
        for worker in 0..jobs {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let store = &store;
            scope.spawn(move || {
                for (index, deck) in job_rx.iter() {
                    let span = info_span!("deck", worker, deck = %deck.display());
                    let _enter = span.enter();
                    let entry = process_batch_deck(global, args, &deck, store);
                    if result_tx.send((index, entry)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    let mut results: Vec<(usize, BatchEntry)> = result_rx.iter().collect();
    results.sort_by_key(|(index, _)| *index);
    let entries: Vec<BatchEntry> = results.into_iter().map(|(_, e)| e).collect();

    write_json(&args.output_root.join(BATCH_SUMMARY_FILE), &entries)?;
    Ok(entries)
}

fn process_batch_deck(
    global: &GlobalOpts,
    args: &BatchArgs,
    deck: &Path,
    store: &AliasStore,
) -> BatchEntry {
    let output_dir = deck_output_dir(&args.output_root, deck);
    let run_args = RunArgs {
        deck: deck.to_path_buf(),
        llm_output: None,
        output_dir: Some(output_dir.clone()),
        allow_llm_aliases: args.allow_llm_aliases,
        learned_aliases: None,
    };
    // A batch-wide --deck-id would apply one deck's overrides to all of them.
    let per_deck = GlobalOpts {
        config: global.config.clone(),
        deck_id: None,
    };
    match run_deck(&per_deck, &run_args, &output_dir, Some(store)) {
        Ok(manifest) => BatchEntry {
            deck: deck.display().to_string(),
            output_dir: output_dir.display().to_string(),
            ok: true,
            verified_count: Some(manifest.verified_count),
            error: None,
        },
        Err(e) => {
            error!(error = %format!("{e:#}"), "deck failed");
            BatchEntry {
                deck: deck.display().to_string(),
                output_dir: output_dir.display().to_string(),
                ok: false,
                verified_count: None,
                error: Some(format!("{e:#}")),
            }
        }
    }
}

// ── merge-aliases ──────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct MergeAliasesArgs {
    /// Learned alias file (defaults to the per-user one)
    pub learned_aliases: Option<PathBuf>,
}

pub fn merge_aliases(global: &GlobalOpts, args: MergeAliasesArgs) -> Result<()> {
    let learned = args
        .learned_aliases
        .unwrap_or_else(default_learned_aliases_path);
    let config_path = resolve_config_path(global.config.as_deref());
    let merged = AliasStore::new(learned).merge_into_config(&config_path)?;
    println!("Merged {merged} canonical entries into {}", config_path.display());
    Ok(())
}

// ── helpers ────────────────────────────────────────────────────────────────

/// Leniently parse a JSON file produced by a model or an earlier stage.
/// A missing path or unparseable contents yield `None`.
fn read_json_lenient(path: Option<&Path>) -> Result<Option<Value>> {
    let Some(path) = path else {
        return Ok(None);
    };
    if !path.exists() {
        warn!(path = %path.display(), "input file not found; treating as empty");
        return Ok(None);
    }
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(parse_json_lenient(&raw))
}

fn emit_json<T: Serialize + ?Sized>(output: Option<&Path>, value: &T) -> Result<()> {
    match output {
        Some(path) => write_json(path, value),
        None => {
            println!("{}", serde_json::to_string_pretty(value)?);
            Ok(())
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_text(path, &json)
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, text).with_context(|| format!("write {}", path.display()))
}

fn sha256_hex(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global_with_config(dir: &Path) -> GlobalOpts {
        GlobalOpts {
            config: Some(dir.join("config.json")),
            deck_id: None,
        }
    }

    fn write_deck(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).expect("write deck");
        path
    }

    #[test]
    fn run_writes_every_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let deck = write_deck(
            dir.path(),
            "acme.txt",
            "Leadership Team:\nLiam Nguyn, Founder\nAcme Robotics builds GPU clusters",
        );
        let output_dir = dir.path().join("out");
        fs::create_dir_all(&output_dir).expect("mkdir");
        fs::write(
            output_dir.join(LLM_CANDIDATES_FILE),
            "```json\n[{\"canonical\": \"Acme Robotics\", \"variants\": [\"Acme Robotic\"], \"classes\": [\"ORG\"], \"priority\": 0.9}]\n```",
        )
        .expect("write llm");

        let args = RunArgs {
            deck: deck.clone(),
            llm_output: None,
            output_dir: Some(output_dir.clone()),
            allow_llm_aliases: false,
            learned_aliases: None,
        };
        let manifest =
            run_deck(&global_with_config(dir.path()), &args, &output_dir, None).expect("run");

        for name in [
            DECK_TEXT_FILE,
            SEEDS_FILE,
            MINE_STATS_FILE,
            VERIFIED_TERMS_FILE,
            VERIFY_STATS_FILE,
            LEARNED_ALIASES_FILE,
            RUN_MANIFEST_FILE,
        ] {
            assert!(output_dir.join(name).exists(), "missing artifact {name}");
        }
        assert_eq!(manifest.deck_id.as_deref(), Some("acme"));
        assert_eq!(manifest.deck_text_sha256.len(), 64);
        assert_eq!(manifest.verify_stats.llm_used, 1);
        assert_eq!(manifest.learned_aliases_added, 1);
        assert!(manifest.llm_candidates.is_some());

        let text = fs::read_to_string(output_dir.join(DECK_TEXT_FILE)).expect("deck text");
        assert!(text.contains("Liam Nguyen"));
    }

    #[test]
    fn batch_reports_failures_without_aborting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let good = write_deck(dir.path(), "good.txt", "Acme Robotics\nGlobex Labs");
        let bad = write_deck(dir.path(), "bad.pptx", "binary");
        let root = dir.path().join("out");

        let args = BatchArgs {
            decks: vec![good, bad],
            output_root: root.clone(),
            jobs: Some(2),
            allow_llm_aliases: false,
            learned_aliases: None,
        };
        let entries = run_batch(&global_with_config(dir.path()), &args).expect("batch");

        assert_eq!(entries.len(), 2);
        assert!(entries[0].ok);
        assert!(!entries[1].ok);
        assert!(entries[1].error.as_deref().unwrap_or("").contains("unsupported"));
        assert!(root.join("good").join(RUN_MANIFEST_FILE).exists());
        assert!(root.join(BATCH_SUMMARY_FILE).exists());
    }

    #[test]
    fn lenient_reader_tolerates_missing_and_noisy_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(read_json_lenient(Some(&dir.path().join("absent.json")))
            .expect("read")
            .is_none());
        let noisy = dir.path().join("noisy.json");
        fs::write(&noisy, "Sure! Here you go:\n{\"terms\": []} trailing").expect("write");
        assert_eq!(
            read_json_lenient(Some(&noisy)).expect("read"),
            Some(serde_json::json!({ "terms": [] }))
        );
    }

    #[test]
    fn sha256_is_lowercase_hex() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
