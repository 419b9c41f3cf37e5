//! Segment fetcher: one long-lived NNTP connection with reconnect-and-retry
//!
//! A [`SegmentFetcher`] owns at most one connection at a time. It connects
//! lazily on its first fetch; if that very first connection cannot be made
//! there is no server to talk to and the failure is fatal
//! ([`FetchError::Connect`]). After that, a transient failure (reset, timeout,
//! unexpected EOF) drops the connection, waits out an exponential backoff and
//! retries the same request on a fresh connection, up to
//! [`RetryConfig::max_attempts`] retries. Application-level refusals such as a
//! missing article are reported immediately.
//!
//! The network side sits behind the [`Connector`] / [`ArticleConnection`]
//! traits so the fetcher can be exercised without a server.

mod nntp;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod mock;

pub use nntp::NntpConnector;

use crate::config::RetryConfig;
use crate::error::FetchError;
use crate::retry::{Backoff, IsRetryable};
use std::sync::Arc;

/// One established session able to retrieve article bodies
#[async_trait::async_trait]
pub trait ArticleConnection: Send {
    /// Fetch the raw body of an article, dot-unstuffed, without the terminator
    ///
    /// `message_id` is given without angle brackets.
    async fn fetch_body(&mut self, message_id: &str) -> nntp_rs::Result<Vec<u8>>;

    /// Politely end the session
    async fn quit(&mut self) -> nntp_rs::Result<()> {
        Ok(())
    }
}

/// Factory for [`ArticleConnection`]s (connect + authenticate)
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Open and authenticate a new session
    async fn connect(&self) -> nntp_rs::Result<Box<dyn ArticleConnection>>;
}

/// Fetches segment bodies over one connection at a time
pub struct SegmentFetcher {
    connector: Arc<dyn Connector>,
    conn: Option<Box<dyn ArticleConnection>>,
    retry: RetryConfig,
    ever_connected: bool,
}

impl SegmentFetcher {
    /// Create a fetcher; no connection is made until the first fetch
    pub fn new(connector: Arc<dyn Connector>, retry: RetryConfig) -> Self {
        Self {
            connector,
            conn: None,
            retry,
            ever_connected: false,
        }
    }

    /// Whether a connection is currently held
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Fetch the body lines of one article
    ///
    /// Returns every line of the body or a failure, never a partial body.
    /// Lines have their line terminator removed.
    pub async fn fetch(&mut self, message_id: &str) -> Result<Vec<Vec<u8>>, FetchError> {
        if !self.ever_connected {
            let conn = self.connector.connect().await.map_err(|e| {
                tracing::error!(error = %e, "Unable to connect to NNTP server");
                FetchError::Connect(e.to_string())
            })?;
            tracing::debug!("NNTP connection established");
            self.conn = Some(conn);
            self.ever_connected = true;
        }

        let mut backoff = Backoff::new(&self.retry);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match self.attempt(message_id).await {
                Ok(body) => {
                    tracing::trace!(message_id, bytes = body.len(), attempt, "Fetched article body");
                    return Ok(split_lines(&body));
                }
                Err(e) if !e.is_retryable() => {
                    return Err(FetchError::Article {
                        message_id: message_id.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    if attempt > self.retry.max_attempts {
                        tracing::warn!(
                            message_id,
                            attempts = attempt,
                            error = %e,
                            "Retry budget exhausted"
                        );
                        return Err(FetchError::Exhausted {
                            message_id: message_id.to_string(),
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }

                    let delay = backoff.next_delay();
                    tracing::warn!(
                        message_id,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient NNTP failure, reconnecting"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One request on the current connection, reconnecting first if there is none
    ///
    /// The connection is dropped on a transient failure and kept otherwise.
    async fn attempt(&mut self, message_id: &str) -> nntp_rs::Result<Vec<u8>> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.connector.connect().await?,
        };

        let result = conn.fetch_body(message_id).await;
        match &result {
            Err(e) if e.is_retryable() => {}
            _ => self.conn = Some(conn),
        }
        result
    }

    /// Close the held connection, if any
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take()
            && let Err(e) = conn.quit().await
        {
            tracing::debug!(error = %e, "Error while closing NNTP connection");
        }
    }
}

/// Split a body into lines, dropping `\n` / `\r\n` terminators
pub(crate) fn split_lines(body: &[u8]) -> Vec<Vec<u8>> {
    if body.is_empty() {
        return Vec::new();
    }

    let mut lines: Vec<Vec<u8>> = body
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line).to_vec())
        .collect();

    // A trailing terminator leaves one empty fragment behind
    if body.ends_with(b"\n") {
        lines.pop();
    }
    lines
}
