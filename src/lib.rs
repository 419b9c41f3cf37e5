//! # usenet-fetch
//!
//! Resumable, multi-connection Usenet downloader that reassembles yEnc-encoded
//! files segment by segment.
//!
//! ## Design
//!
//! - **One store per job** - every file and segment of an NZB lives in
//!   `<target_dir>/parts.db`; progress survives kills and restarts
//! - **Claim, fetch, record** - segments are claimed atomically, fetched by a
//!   bounded pool of connections, decoded straight to their byte offset, and
//!   recorded against exactly the segment that produced them
//! - **Warn, then verify** - inline checksum mismatches only warn; the
//!   read-only [`verify`](verify::verify) pass is the integrity gate
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use usenet_fetch::{Config, Database, Engine, NntpConnector, manifest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Path::new("usenet-fetch.json"))?;
//!     let (target_dir, _) = manifest::start_job(Path::new("show.nzb"), None).await?;
//!
//!     let db = Database::open_job(&target_dir).await?;
//!     let connector = Arc::new(NntpConnector::new(&config.server));
//!     let engine = Engine::new(&db, &config, connector, target_dir.clone());
//!     let summary = engine.run(CancellationToken::new()).await?;
//!     println!("{} segments downloaded", summary.succeeded);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Command-line front end
pub mod cli;
/// Configuration types
pub mod config;
/// Job store
pub mod db;
/// yEnc stream decoder
pub mod decoder;
/// Claim-submit-record loop
pub mod engine;
/// Error types
pub mod error;
/// Single-connection segment fetcher
pub mod fetcher;
/// NZB manifest ingest
pub mod manifest;
/// Bounded fetch worker pool
pub mod pool;
/// Retry classification and exponential backoff
pub mod retry;
/// Core types
pub mod types;
/// Read-only verification pass
pub mod verify;

// Re-export commonly used types
pub use config::{Config, FetchConfig, RetryConfig, ServerConfig};
pub use db::Database;
pub use engine::Engine;
pub use error::{DatabaseError, DecodeError, Error, FetchError, Result};
pub use fetcher::{ArticleConnection, Connector, NntpConnector, SegmentFetcher};
pub use pool::{Completion, FetchPool, Outcome};
pub use types::{DecodeResult, FileId, RunSummary, SegmentKey, StoreSummary};
pub use verify::{Mismatch, VerifyReport};

/// Cancel `token` when the process receives a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Must be called from within a tokio runtime.
pub fn cancel_on_signal(token: tokio_util::sync::CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                tracing::info!("Stopping, finishing in-flight segments");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received Ctrl+C signal");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
