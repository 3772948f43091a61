//! `deckbias` command-line host.
//!
//! Turns pitch decks into ASR bias term lists. The core library does the
//! work; this binary owns file layout, learned-alias storage and batch
//! scheduling. Logs go to stderr so JSON on stdout stays pipeable.

mod commands;
mod settings;
mod storage;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use commands::{
    BatchArgs, ExtractArgs, GlobalOpts, MergeAliasesArgs, MineArgs, RunArgs, VerifyArgs,
};

const DEFAULT_LOG_FILTER: &str = "deckbias_core=info,deckbias_app=info";

#[derive(Parser, Debug)]
#[command(name = "deckbias", version, about = "Deck vocabulary mining for ASR biasing")]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract and normalize deck text
    Extract(ExtractArgs),
    /// Mine deterministic seed terms from deck text
    Mine(MineArgs),
    /// Consolidate seeds and LLM candidates into verified terms
    Verify(VerifyArgs),
    /// Run the full pipeline for one deck and write its artifacts
    Run(RunArgs),
    /// Run the pipeline for many decks in parallel
    Batch(BatchArgs),
    /// Fold learned aliases into the configuration file
    MergeAliases(MergeAliasesArgs),
}

fn main() -> Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!(version = env!("CARGO_PKG_VERSION"), "deckbias starting");

    match cli.command {
        Command::Extract(args) => commands::extract(&cli.global, args),
        Command::Mine(args) => commands::mine(&cli.global, args),
        Command::Verify(args) => commands::verify(&cli.global, args),
        Command::Run(args) => commands::run(&cli.global, args),
        Command::Batch(args) => commands::batch(&cli.global, args),
        Command::MergeAliases(args) => commands::merge_aliases(&cli.global, args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "deckbias",
            "run",
            "deck.txt",
            "--config",
            "cfg.json",
            "--deck-id",
            "acme",
            "--allow-llm-aliases",
        ])
        .expect("parse");
        assert_eq!(cli.global.deck_id.as_deref(), Some("acme"));
        match cli.command {
            Command::Run(args) => {
                assert!(args.allow_llm_aliases);
                assert_eq!(args.deck, std::path::PathBuf::from("deck.txt"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn batch_requires_a_deck() {
        assert!(Cli::try_parse_from(["deckbias", "batch"]).is_err());
    }
}
