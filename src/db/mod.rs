//! Job store for usenet-fetch
//!
//! One SQLite database per download job (`<target_dir>/parts.db`) holding the
//! files of the manifest and the segments that make them up. The store is the
//! single source of truth for what remains to be fetched; the fetch pool only
//! ever holds segments it claimed here.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`files`] — File records and subject filename guessing
//! - [`segments`] — Segment claims, outcomes and progress queries

use crate::types::FileId;
use sqlx::{FromRow, sqlite::SqlitePool};

mod files;
mod migrations;
mod segments;

pub use files::guess_filename;
pub use migrations::JOB_DB_NAME;

/// New file to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewFile {
    /// Poster as listed in the manifest
    pub poster: String,
    /// Posting date (unix timestamp)
    pub date: i64,
    /// Subject line, the source of the guessed filename
    pub subject: String,
    /// Newsgroups the file was posted to
    pub groups: Vec<String>,
}

/// New segment to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewSegment {
    /// Usenet message-ID, without angle brackets
    pub message_id: String,
    /// Encoded size in bytes as listed in the manifest
    pub bytes: i64,
    /// Part index (1-based)
    pub part: i64,
    /// Number of parts of the owning file
    pub total: i64,
}

/// File record from database
#[derive(Debug, Clone, FromRow)]
pub struct FileRecord {
    /// Unique database ID
    pub id: FileId,
    /// Poster as listed in the manifest
    pub poster: String,
    /// Posting date (unix timestamp)
    pub date: i64,
    /// Subject line
    pub subject: String,
    /// Filename guessed from the subject, empty when nothing matched
    pub guessed_filename: String,
    /// Newsgroups, `;`-joined
    pub groups: String,
}

impl FileRecord {
    /// Newsgroups as a list
    pub fn group_list(&self) -> Vec<&str> {
        self.groups.split(';').filter(|g| !g.is_empty()).collect()
    }
}

/// Segment record from database
#[derive(Debug, Clone, FromRow)]
pub struct Segment {
    /// Owning file
    pub file_id: FileId,
    /// Part index (1-based)
    pub part: i64,
    /// Usenet message-ID, without angle brackets
    pub message_id: String,
    /// Encoded size in bytes
    pub bytes: i64,
    /// Decoded filename, empty until the segment has been decoded
    pub filename: String,
    /// Number of parts of the owning file
    pub total: i64,
    /// First byte of the segment within the file (1-based, inclusive)
    pub byte_begin: Option<i64>,
    /// Last byte of the segment within the file (1-based, inclusive)
    pub byte_end: Option<i64>,
    /// Per-part CRC-32
    pub pcrc32: Option<u32>,
    /// Attempts made so far
    pub tries: i64,
    /// Failed attempts so far
    pub errors: i64,
    /// Decoded and written
    pub complete: bool,
    /// Unix timestamp of the active claim, if any
    pub claimed_at: Option<i64>,
}

impl Segment {
    /// Identity of this segment
    pub fn key(&self) -> crate::types::SegmentKey {
        crate::types::SegmentKey::new(self.file_id, self.part)
    }
}

/// Database handle for a download job
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
