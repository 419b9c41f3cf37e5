//! Core types for usenet-fetch

use serde::{Deserialize, Serialize};

/// Store-assigned identifier of a file
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub i64);

impl FileId {
    /// Create a new FileId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for FileId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<FileId> for i64 {
    fn from(id: FileId) -> Self {
        id.0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for FileId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for FileId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for FileId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for FileId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Identity of one segment: owning file plus 1-based part index
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentKey {
    /// Owning file
    pub file_id: FileId,
    /// Part index within the file
    pub part: i64,
}

impl SegmentKey {
    /// Create a key from its parts
    pub fn new(file_id: FileId, part: i64) -> Self {
        Self { file_id, part }
    }
}

impl std::fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.file_id, self.part)
    }
}

/// What the stream decoder learned from one segment
///
/// `begin`/`end` are 1-based and inclusive. `crc32` and `size` are only present
/// when the segment was a whole single-part file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeResult {
    /// Sanitized output filename
    pub name: String,
    /// First byte of this segment within the file
    pub begin: u64,
    /// Last byte of this segment within the file
    pub end: u64,
    /// Per-part checksum to persist
    pub pcrc32: u32,
    /// Whole-file checksum from the trailer
    pub crc32: Option<u32>,
    /// Whole-file size from the header
    pub size: Option<u64>,
}

impl DecodeResult {
    /// Number of decoded bytes this segment covers
    pub fn len(&self) -> u64 {
        self.end + 1 - self.begin
    }

    /// Always false for a successful decode; present for clippy's `len_without_is_empty`
    pub fn is_empty(&self) -> bool {
        self.end < self.begin
    }
}

/// Progress counters of a job store
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSummary {
    /// Files in the job
    pub files: u64,
    /// Segments in the job
    pub segments: u64,
    /// Segments decoded and written
    pub complete: u64,
    /// Segments still eligible for fetching
    pub pending: u64,
    /// Segments that used up their tries and will not be fetched again
    pub exhausted: u64,
}

impl StoreSummary {
    /// True when no segment is left to try
    pub fn is_finished(&self) -> bool {
        self.pending == 0
    }
}

/// Outcome counters of one engine run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Segments decoded and recorded complete during this run
    pub succeeded: u64,
    /// Failed attempts recorded during this run
    pub failed: u64,
    /// Claim queries issued against the store
    pub claim_queries: u64,
    /// Segments left exhausted in the store when the run ended
    pub exhausted_segments: u64,
    /// Whether the run stopped because of a cancel request
    pub cancelled: bool,
}
