//! Command-line surface: `start`, `continue`, `verify`, `status`, `reset`

use crate::config::{Config, FetchConfig};
use crate::db::Database;
use crate::engine::Engine;
use crate::error::Result;
use crate::fetcher::NntpConnector;
use crate::types::FileId;
use crate::{manifest, verify};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Resumable multi-connection Usenet downloader
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: ~/.usenet-fetch.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Action to run
    #[command(subcommand)]
    pub command: Command,
}

/// Actions
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a job directory from an NZB manifest
    Start {
        /// NZB manifest
        manifest: PathBuf,
        /// Job directory (default: <manifest>_content)
        target_dir: Option<PathBuf>,
    },
    /// Download everything that is still eligible
    Continue {
        /// Job directory
        target_dir: PathBuf,
    },
    /// Re-check written segments against their checksums
    Verify {
        /// Job directory
        target_dir: PathBuf,
    },
    /// Show progress of a job
    Status {
        /// Job directory
        target_dir: PathBuf,
    },
    /// Make one segment eligible for fetching again
    Reset {
        /// Job directory
        target_dir: PathBuf,
        /// File id as shown by `verify`
        file_id: FileId,
        /// Part index
        part: i64,
    },
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }
}

/// Run the selected action; `Ok(false)` means it ran but found problems
pub async fn execute(cli: Cli) -> Result<bool> {
    let config_path = cli.config_path();

    match cli.command {
        Command::Start {
            manifest,
            target_dir,
        } => {
            let (target_dir, counts) = manifest::start_job(&manifest, target_dir).await?;
            println!(
                "Created {} with {} files and {} segments",
                target_dir.display(),
                counts.files,
                counts.segments
            );
            Ok(true)
        }
        Command::Continue { target_dir } => run_continue(&config_path, &target_dir).await,
        Command::Verify { target_dir } => {
            let db = Database::open_job(&target_dir).await?;
            let report = verify::verify(&db, &target_dir).await;
            db.close().await;
            let report = report?;

            for missing in &report.missing_files {
                println!("missing file: {}", missing);
            }
            for m in &report.mismatches {
                println!("mismatch: file {} ({}) part {}", m.file_id, m.filename, m.part);
            }
            println!(
                "{} segments checked, {} mismatches",
                report.segments_checked,
                report.mismatches.len()
            );
            Ok(report.is_clean())
        }
        Command::Status { target_dir } => {
            let max_tries = status_max_tries(&config_path);
            let db = Database::open_job(&target_dir).await?;
            let summary = db.summary(max_tries).await;
            db.close().await;
            let summary = summary?;

            println!(
                "{} files, {} segments: {} complete, {} pending, {} exhausted",
                summary.files,
                summary.segments,
                summary.complete,
                summary.pending,
                summary.exhausted
            );
            Ok(true)
        }
        Command::Reset {
            target_dir,
            file_id,
            part,
        } => {
            let db = Database::open_job(&target_dir).await?;
            let result = db.reset_segment(file_id, part).await;
            db.close().await;
            result?;

            println!("Segment {}/{} will be fetched again", file_id, part);
            Ok(true)
        }
    }
}

async fn run_continue(config_path: &Path, target_dir: &Path) -> Result<bool> {
    let config = Config::load(config_path)?;
    let db = Database::open_job(target_dir).await?;

    let cancel = CancellationToken::new();
    crate::cancel_on_signal(cancel.clone());

    let connector = Arc::new(NntpConnector::new(&config.server));
    let engine = Engine::new(&db, &config, connector, target_dir.to_path_buf());
    let result = engine.run(cancel).await;
    db.close().await;
    let summary = result?;

    println!(
        "{} segments downloaded, {} failed attempts, {} segments exhausted{}",
        summary.succeeded,
        summary.failed,
        summary.exhausted_segments,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    Ok(summary.exhausted_segments == 0)
}

/// `status` works without a configuration file, falling back to the default cap
fn status_max_tries(config_path: &Path) -> u32 {
    match Config::load(config_path) {
        Ok(config) => config.fetch.max_tries,
        Err(e) => {
            tracing::debug!(error = %e, "Using default max_tries for status");
            FetchConfig::default().max_tries
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_start_with_optional_target() {
        let cli = Cli::try_parse_from(["usenet-fetch", "start", "show.nzb"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Start { ref manifest, target_dir: None } if manifest == Path::new("show.nzb")
        ));

        let cli = Cli::try_parse_from(["usenet-fetch", "start", "show.nzb", "out"]).unwrap();
        assert!(matches!(cli.command, Command::Start { target_dir: Some(_), .. }));
    }

    #[test]
    fn parses_reset_and_global_flags() {
        let cli = Cli::try_parse_from([
            "usenet-fetch",
            "reset",
            "job",
            "3",
            "2",
            "--config",
            "/etc/uf.json",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config_path(), PathBuf::from("/etc/uf.json"));
        match cli.command {
            Command::Reset { file_id, part, .. } => {
                assert_eq!(file_id, FileId(3));
                assert_eq!(part, 2);
            }
            other => panic!("expected reset, got {:?}", other),
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(Cli::try_parse_from(["usenet-fetch", "download", "x"]).is_err());
    }

    #[test]
    fn status_falls_back_to_default_cap() {
        assert_eq!(status_max_tries(Path::new("/nonexistent/uf.json")), 3);
    }
}
