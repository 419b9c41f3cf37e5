//! One fetch worker: fetch, decode, report, repeat.

use super::{Completion, Finished, Outcome};
use crate::config::RetryConfig;
use crate::db::Segment;
use crate::decoder;
use crate::error::DecodeError;
use crate::fetcher::{Connector, SegmentFetcher};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

pub(super) struct Worker {
    id: usize,
    fetcher: SegmentFetcher,
    target_dir: Arc<PathBuf>,
    done: mpsc::UnboundedSender<Finished>,
}

impl Worker {
    pub(super) fn new(
        id: usize,
        connector: Arc<dyn Connector>,
        retry: RetryConfig,
        target_dir: Arc<PathBuf>,
        done: mpsc::UnboundedSender<Finished>,
    ) -> Self {
        Self {
            id,
            fetcher: SegmentFetcher::new(connector, retry),
            target_dir,
            done,
        }
    }

    /// Process segments until the job channel closes
    pub(super) async fn run(mut self, mut jobs: mpsc::Receiver<Segment>) {
        while let Some(segment) = jobs.recv().await {
            let outcome = self.process(&segment).await;
            let finished = Finished {
                worker: self.id,
                completion: Completion { segment, outcome },
            };
            if self.done.send(finished).is_err() {
                break;
            }
        }

        self.fetcher.close().await;
        tracing::trace!(worker = self.id, "Fetch worker stopped");
    }

    async fn process(&mut self, segment: &Segment) -> Outcome {
        let lines = match self.fetcher.fetch(&segment.message_id).await {
            Ok(lines) => lines,
            Err(e) => {
                if !e.is_fatal() {
                    tracing::warn!(
                        file_id = segment.file_id.get(),
                        part = segment.part,
                        message_id = %segment.message_id,
                        error = %e,
                        "Segment fetch failed"
                    );
                }
                return Outcome::FetchFailed(e);
            }
        };

        // yEnc decode and disk I/O stay off the async worker threads
        let key = segment.key();
        let target_dir = self.target_dir.clone();
        let decoded = tokio::task::spawn_blocking(move || {
            decoder::decode_segment(&lines, &target_dir, key)
        })
        .await
        .unwrap_or_else(|e| Err(DecodeError::Aborted(e.to_string())));

        match decoded {
            Ok(result) => {
                tracing::debug!(
                    file_id = segment.file_id.get(),
                    part = segment.part,
                    filename = %result.name,
                    begin = result.begin,
                    end = result.end,
                    "Segment decoded"
                );
                Outcome::Decoded(result)
            }
            Err(e) => {
                tracing::warn!(
                    file_id = segment.file_id.get(),
                    part = segment.part,
                    message_id = %segment.message_id,
                    error = %e,
                    "Segment decode failed"
                );
                Outcome::DecodeFailed(e)
            }
        }
    }
}
