//! Download engine: claims segments from the job store, feeds the fetch pool,
//! and records every completion against the segment that produced it.
//!
//! The store is the only record of progress. The engine holds a segment only
//! between claiming it and recording its outcome, so a killed process leaves
//! nothing behind that a later `continue` cannot pick up again.

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::fetcher::Connector;
use crate::pool::{Completion, FetchPool, Outcome};
use crate::types::RunSummary;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Drives one job until nothing is eligible, the run is cancelled, or the
/// server turns out to be unreachable
pub struct Engine<'a> {
    db: &'a Database,
    pool: FetchPool,
    max_tries: u32,
    claim_lease: Duration,
}

impl<'a> Engine<'a> {
    /// Create an engine for the job stored in `db`, writing into `target_dir`
    pub fn new(
        db: &'a Database,
        config: &Config,
        connector: Arc<dyn Connector>,
        target_dir: PathBuf,
    ) -> Self {
        let pool = FetchPool::new(
            config.fetch.connections,
            connector,
            config.retry.clone(),
            target_dir,
        );

        Self {
            db,
            pool,
            max_tries: config.fetch.max_tries,
            claim_lease: config.fetch.claim_lease,
        }
    }

    /// Run to completion or until `cancel` fires
    ///
    /// The pool is always drained before returning, and every drained
    /// completion is recorded. A fatal connection failure is returned as
    /// [`Error::Nntp`] after the drain.
    pub async fn run(self, cancel: CancellationToken) -> Result<RunSummary> {
        let Engine {
            db,
            mut pool,
            max_tries,
            claim_lease,
        } = self;

        let released = db.release_claims().await?;
        if released > 0 {
            tracing::info!(released, "Released claims left behind by an earlier run");
        }

        let mut recorder = Recorder {
            db,
            max_tries,
            summary: RunSummary::default(),
            fatal: None,
        };

        tracing::info!(
            workers = pool.size(),
            max_tries,
            "Starting download run"
        );

        let dispatched = dispatch(&mut pool, &mut recorder, &cancel, claim_lease).await;

        let leftovers = pool.drain().await;
        let mut drain_error = None;
        for completion in leftovers {
            if let Err(e) = recorder.record(completion).await {
                tracing::error!(error = %e, "Failed to record completion during drain");
                drain_error.get_or_insert(e);
            }
        }

        dispatched?;
        if let Some(e) = drain_error {
            return Err(e);
        }
        if let Some(message) = recorder.fatal {
            return Err(Error::Nntp(message));
        }

        let mut summary = recorder.summary;
        summary.cancelled = cancel.is_cancelled();
        summary.exhausted_segments = db.summary(max_tries).await?.exhausted;

        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            exhausted = summary.exhausted_segments,
            cancelled = summary.cancelled,
            "Download run finished"
        );
        if summary.exhausted_segments > 0 {
            tracing::warn!(
                exhausted = summary.exhausted_segments,
                "Some segments used up their tries and will not be fetched again"
            );
        }

        Ok(summary)
    }
}

/// Claim-submit-record loop; returns once there is nothing left to do,
/// on cancel, or after a fatal completion
async fn dispatch(
    pool: &mut FetchPool,
    recorder: &mut Recorder<'_>,
    cancel: &CancellationToken,
    claim_lease: Duration,
) -> Result<()> {
    loop {
        while let Some(completion) = pool.try_next_completion() {
            recorder.record(completion).await?;
        }
        if recorder.fatal.is_some() || cancel.is_cancelled() {
            return Ok(());
        }

        let idle = pool.idle_count();
        let claimed = recorder
            .db
            .claim_eligible(idle, recorder.max_tries, claim_lease)
            .await?;
        recorder.summary.claim_queries += 1;

        if claimed.is_empty() && pool.in_flight() == 0 {
            tracing::debug!("No eligible segments left");
            return Ok(());
        }

        let mut submitted = 0usize;
        let mut claimed = claimed.into_iter();
        while let Some(segment) = claimed.next() {
            // The claim lease ran out while a worker still had it; that
            // worker will record it
            if pool.is_in_flight(&segment.key()) {
                tracing::debug!(
                    file_id = segment.file_id.get(),
                    part = segment.part,
                    "Reclaimed segment is still in flight"
                );
                continue;
            }

            let stopped = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                ready = pool.wait_idle() => {
                    ready?;
                    false
                }
            };
            if stopped {
                recorder.release(&segment).await?;
                for rest in claimed.by_ref() {
                    if !pool.is_in_flight(&rest.key()) {
                        recorder.release(&rest).await?;
                    }
                }
                return Ok(());
            }

            pool.submit(segment).await?;
            submitted += 1;
        }

        // Keep claiming while workers are idle and new work went out
        if submitted > 0 && pool.idle_count() > 0 {
            continue;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(in_flight = pool.in_flight(), "Cancel requested, draining in-flight segments");
                return Ok(());
            }
            completion = pool.next_completion() => {
                if let Some(completion) = completion {
                    recorder.record(completion).await?;
                }
            }
        }
    }
}

/// Writes completions back to the job store
struct Recorder<'a> {
    db: &'a Database,
    max_tries: u32,
    summary: RunSummary,
    fatal: Option<String>,
}

impl Recorder<'_> {
    async fn record(&mut self, completion: Completion) -> Result<()> {
        let Completion { segment, outcome } = completion;

        match outcome {
            Outcome::Decoded(result) => {
                self.db
                    .record_success(
                        segment.file_id,
                        segment.part,
                        &result.name,
                        result.begin,
                        result.end,
                        result.pcrc32,
                    )
                    .await?;
                self.summary.succeeded += 1;
            }
            Outcome::FetchFailed(e) if e.is_fatal() => {
                // Never attempted, so the try is not counted
                self.release(&segment).await?;
                if self.fatal.is_none() {
                    tracing::error!(error = %e, "NNTP server unreachable, stopping");
                    self.fatal = Some(e.to_string());
                }
            }
            Outcome::FetchFailed(_) | Outcome::DecodeFailed(_) => {
                self.db.record_failure(segment.file_id, segment.part).await?;
                self.summary.failed += 1;

                let tries = segment.tries + 1;
                if tries >= self.max_tries as i64 {
                    tracing::warn!(
                        file_id = segment.file_id.get(),
                        part = segment.part,
                        message_id = %segment.message_id,
                        tries,
                        "Segment exhausted its tries"
                    );
                }
            }
        }
        Ok(())
    }

    async fn release(&self, segment: &crate::db::Segment) -> Result<()> {
        self.db.release_claim(segment.file_id, segment.part).await
    }
}
