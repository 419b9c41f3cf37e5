//! Retry classification and exponential backoff
//!
//! The segment fetcher runs an explicit retry loop (it has to drop and rebuild
//! its connection between attempts), so this module only supplies the two
//! pieces that loop needs: [`IsRetryable`] to decide whether an error deserves
//! another attempt, and [`Backoff`] to space the attempts out.
//!
//! # Example
//!
//! ```
//! use usenet_fetch::config::RetryConfig;
//! use usenet_fetch::retry::Backoff;
//! use std::time::Duration;
//!
//! let config = RetryConfig { jitter: false, ..RetryConfig::default() };
//! let mut backoff = Backoff::new(&config);
//! assert_eq!(backoff.next_delay(), Duration::from_secs(1));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(2));
//! ```

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, server busy, connection reset) should return `true`.
/// Permanent failures (missing article, authentication failed, corrupt data) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for nntp_rs::NntpError {
    fn is_retryable(&self) -> bool {
        use nntp_rs::NntpError;

        match self {
            // Broken pipe, reset, unexpected EOF: the stream is gone
            NntpError::Io(_) => true,
            NntpError::Timeout | NntpError::ConnectionClosed => true,
            // Garbage on the wire or a failed TLS read leaves the session unusable
            NntpError::InvalidResponse(_) | NntpError::Tls(_) => true,
            // 400 = service unavailable / idle or session timeout
            NntpError::Protocol { code, .. } => matches!(code, 400 | 503),
            NntpError::TransferNotPossible(_) => true,
            NntpError::Other(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("timeout") || msg.contains("connection")
            }
            // Missing articles, auth failures and the rest are answers, not accidents
            _ => false,
        }
    }
}

/// Exponential backoff schedule for one retry loop
#[derive(Debug, Clone)]
pub struct Backoff {
    delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Backoff {
    /// Start a fresh schedule at the configured initial delay
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            delay: config.initial_delay,
            max_delay: config.max_delay,
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }

    /// Delay to wait before the next attempt; advances the schedule
    pub fn next_delay(&mut self) -> Duration {
        let current = if self.jitter {
            add_jitter(self.delay)
        } else {
            self.delay
        };

        let next = Duration::try_from_secs_f64(self.delay.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max_delay);
        self.delay = next.min(self.max_delay);

        current
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay.
/// This means the actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::try_from_secs_f64(jittered_secs).unwrap_or(delay)
}
