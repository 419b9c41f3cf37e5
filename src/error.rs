//! Error types for usenet-fetch
//!
//! Failures are split by how far they propagate:
//! - [`FetchError`] and [`DecodeError`] are local to one segment and end up as a
//!   recorded failure against that segment, never as a process abort
//! - [`Error::Nntp`], [`Error::Config`] and store/disk errors are resource-level
//!   and stop the run

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for usenet-fetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for usenet-fetch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "server.host")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// The NNTP server could not be reached; nothing can proceed without it
    #[error("NNTP error: {0}")]
    Nntp(String),

    /// Invalid NZB manifest
    #[error("invalid NZB: {0}")]
    InvalidNzb(String),

    /// Job directory problem (missing, already present, not a directory)
    #[error("job directory {path}: {reason}")]
    JobDirectory {
        /// The offending directory
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// A segment was submitted while another worker still holds it
    #[error("segment {file_id}/{part} is already in flight")]
    AlreadyInFlight {
        /// Owning file
        file_id: i64,
        /// Part index
        part: i64,
    },

    /// The fetch pool has been drained and accepts no more work
    #[error("fetch pool is shut down")]
    PoolClosed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Failure of a single segment fetch
#[derive(Debug, Error)]
pub enum FetchError {
    /// The fetcher's first connection could not be established (fatal)
    #[error("unable to connect to NNTP server: {0}")]
    Connect(String),

    /// Transient failures kept recurring until the retry budget ran out
    #[error("gave up on {message_id} after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Message-ID that was being fetched
        message_id: String,
        /// Number of requests made
        attempts: u32,
        /// Error of the final attempt
        last_error: String,
    },

    /// Application-level refusal (no such article, bad command, ...)
    #[error("article {message_id} unavailable: {reason}")]
    Article {
        /// Message-ID that was requested
        message_id: String,
        /// Server response or error text
        reason: String,
    },
}

impl FetchError {
    /// Whether this failure must stop the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Connect(_))
    }
}

/// Failure while turning fetched lines into file bytes
#[derive(Debug, Error)]
pub enum DecodeError {
    /// No usable `=ybegin` line in the body
    #[error("no =ybegin header found")]
    MissingHeader,

    /// A multi-part header was not followed by a `=ypart` line
    #[error("=ypart line missing after multi-part header")]
    MissingPart,

    /// The `=ypart` line could not be parsed or describes an impossible range
    #[error("invalid =ypart line: {0}")]
    InvalidPart(String),

    /// Input ended before the `=yend` trailer
    #[error("=yend trailer missing (input ended after {decoded} bytes)")]
    MissingTrailer {
        /// Bytes decoded and written before the input ran out
        decoded: u64,
    },

    /// The payload does not fill the `=ypart` range exactly
    #[error("=ypart range {begin}-{end} does not match {decoded} decoded bytes")]
    RangeMismatch {
        /// First byte of the declared range (1-based)
        begin: u64,
        /// Last byte of the declared range (inclusive)
        end: u64,
        /// Bytes actually decoded
        decoded: u64,
    },

    /// Single-part body with no payload bytes
    #[error("encoded body carries no payload")]
    EmptyPayload,

    /// The blocking decode task did not run to completion
    #[error("decode task aborted: {0}")]
    Aborted(String),

    /// Writing the output file failed
    #[error("failed to write {path}: {source}")]
    Io {
        /// Output path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}
