//! Thin operational entrypoint over the engine's data directory: garbage
//! collection, crash recovery, and blob-store stats. Not an editor
//! integration or a general-purpose CLI — see spec §6.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sessionvault::config::EngineConfig;
use sessionvault::core::EngineError;
use sessionvault::{BlobStore, Engine};

const EXIT_SUCCESS: u8 = 0;
const EXIT_INVALID_ARGS: u8 = 2;
const EXIT_LOCK_TIMEOUT: u8 = 3;
const EXIT_INTEGRITY_FAILURE: u8 = 4;
const EXIT_PARTIAL_ROLLBACK: u8 = 5;

#[derive(Parser)]
#[command(name = "sessionvault-cli", about = "Operational entrypoint for a sessionvault data directory")]
struct Cli {
    /// Directory holding blobs/, catalog/, and .sb_journal/
    #[arg(long, value_name = "PATH")]
    data_dir: PathBuf,

    /// Root of the workspace the tracked paths are relative to. Required
    /// by `recover` so the orphan `.bak-<sessionId>` sweep (spec §4.5)
    /// walks the actual workspace instead of the data directory.
    #[arg(long, value_name = "PATH")]
    workspace_root: Option<PathBuf>,

    /// Optional TOML config file; defaults are used when absent.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reclaim zero-refcount blobs past the grace window.
    Gc,
    /// Replay pending journals and prune old committed ones.
    Recover,
    /// Print blob-store statistics as JSON.
    Stats,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match EngineConfig::from_toml_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("invalid config at {}: {e}", path.display());
                return ExitCode::from(EXIT_INVALID_ARGS);
            }
        },
        None => EngineConfig::default(),
    };

    match run(&cli, config) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(classify_error(&e))
        }
    }
}

fn run(cli: &Cli, config: EngineConfig) -> sessionvault::Result<u8> {
    match cli.command {
        Command::Gc => {
            let store = BlobStore::open(cli.data_dir.as_path())?;
            let collected = store.gc(config.blob_grace_ms)?;
            println!("{}", serde_json::json!({ "collected": collected.len() }));
            Ok(EXIT_SUCCESS)
        }
        Command::Recover => {
            let Some(workspace_root) = cli.workspace_root.clone() else {
                eprintln!("recover requires --workspace-root so the orphan backup sweep can walk the workspace");
                return Ok(EXIT_INVALID_ARGS);
            };
            let engine = Engine::open(cli.data_dir.clone(), workspace_root, "cli", config)?;
            let report = engine.recover()?;
            println!(
                "{}",
                serde_json::json!({
                    "resumedCommits": report.resumed_commits,
                    "undoneRollbacks": report.undone_rollbacks,
                    "discardedEmpty": report.discarded_empty,
                    "prunedCommitted": report.pruned_committed,
                    "orphansRemoved": report.orphans_removed,
                })
            );
            Ok(EXIT_SUCCESS)
        }
        Command::Stats => {
            let store = BlobStore::open(cli.data_dir.as_path())?;
            let stats = store.stats()?;
            println!(
                "{}",
                serde_json::json!({
                    "totalBlobs": stats.total_blobs,
                    "totalUncompressed": stats.total_uncompressed,
                    "totalCompressed": stats.total_compressed,
                    "compressionRatio": stats.compression_ratio(),
                })
            );
            Ok(EXIT_SUCCESS)
        }
    }
}

fn classify_error(err: &EngineError) -> u8 {
    match err {
        EngineError::LockTimeout(_) => EXIT_LOCK_TIMEOUT,
        EngineError::HashMismatch { .. }
        | EngineError::ManifestCorrupt(_)
        | EngineError::JournalCorrupt(_)
        | EngineError::BlobNotFound(_) => EXIT_INTEGRITY_FAILURE,
        EngineError::InvalidPath(_) | EngineError::SessionNotFound(_) => EXIT_INVALID_ARGS,
        _ => EXIT_PARTIAL_ROLLBACK,
    }
}
