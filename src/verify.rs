//! Read-only integrity audit of a job's decoded files
//!
//! For every file with at least one complete segment, each complete segment's
//! byte range is read back from disk and its CRC-32 compared with the stored
//! checksum. Nothing in the job store is changed; mismatches are only reported.

use crate::db::{Database, Segment};
use crate::error::Result;
use crate::types::FileId;
use serde::Serialize;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Read size while hashing a segment's range
const VERIFY_CHUNK: usize = 64 * 1024;

/// A complete segment whose bytes on disk do not match its checksum
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    /// Owning file
    pub file_id: FileId,
    /// Decoded filename
    pub filename: String,
    /// Part index
    pub part: i64,
}

/// Result of a verification pass
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyReport {
    /// Complete segments whose range was checked
    pub segments_checked: u64,
    /// Segments that failed the check
    pub mismatches: Vec<Mismatch>,
    /// Decoded filenames that are not present in the target directory
    pub missing_files: Vec<String>,
}

impl VerifyReport {
    /// True when every checked segment matched
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Re-check every complete segment of the job against the files in `target_dir`
pub async fn verify(db: &Database, target_dir: &Path) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();

    for (file_id, filename) in db.completed_files().await? {
        let mut segments: Vec<Segment> = db
            .segments_for_file(file_id, true)
            .await?
            .into_iter()
            .filter(|s| !s.filename.is_empty())
            .collect();
        segments.sort_by_key(|s| s.byte_begin);

        let path = target_dir.join(&filename);
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!(
                    file_id = file_id.get(),
                    path = %path.display(),
                    error = %e,
                    "Decoded file missing"
                );
                report.missing_files.push(filename.clone());
                None
            }
        };

        for segment in &segments {
            report.segments_checked += 1;

            let matches = match file.as_mut() {
                Some(file) => check_segment(file, segment).await,
                None => false,
            };
            if !matches {
                report.mismatches.push(Mismatch {
                    file_id,
                    filename: filename.clone(),
                    part: segment.part,
                });
            }
        }

        tracing::debug!(
            file_id = file_id.get(),
            filename = %filename,
            segments = segments.len(),
            "Verified file"
        );
    }

    tracing::info!(
        checked = report.segments_checked,
        mismatches = report.mismatches.len(),
        missing_files = report.missing_files.len(),
        "Verification finished"
    );

    Ok(report)
}

/// Whether the segment's range on disk hashes to its stored checksum
async fn check_segment(file: &mut tokio::fs::File, segment: &Segment) -> bool {
    let (Some(begin), Some(end), Some(expected)) =
        (segment.byte_begin, segment.byte_end, segment.pcrc32)
    else {
        tracing::warn!(
            file_id = segment.file_id.get(),
            part = segment.part,
            "Complete segment lacks its range or checksum"
        );
        return false;
    };

    let actual = match hash_range(file, begin, end).await {
        Ok(actual) => actual,
        Err(e) => {
            tracing::warn!(
                file_id = segment.file_id.get(),
                part = segment.part,
                begin,
                end,
                error = %e,
                "Could not read segment range"
            );
            return false;
        }
    };

    if actual != expected {
        tracing::warn!(
            file_id = segment.file_id.get(),
            part = segment.part,
            filename = %segment.filename,
            expected = format_args!("{:08x}", expected),
            actual = format_args!("{:08x}", actual),
            "Checksum mismatch"
        );
        return false;
    }
    true
}

/// CRC-32 of the 1-based inclusive range `begin..=end`, read in fixed-size chunks
///
/// A range that does not lie inside the file is an `UnexpectedEof` error.
async fn hash_range(file: &mut tokio::fs::File, begin: i64, end: i64) -> std::io::Result<u32> {
    if begin < 1 || end < begin {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("impossible range {}-{}", begin, end),
        ));
    }
    let (begin, end) = (begin as u64, end as u64);
    let file_len = file.metadata().await?.len();
    if end > file_len {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("range ends at {} but file has {} bytes", end, file_len),
        ));
    }

    file.seek(std::io::SeekFrom::Start(begin - 1)).await?;
    let mut remaining = end - begin + 1;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; VERIFY_CHUNK.min(remaining as usize)];
    while remaining > 0 {
        let take = buf.len().min(remaining as usize);
        file.read_exact(&mut buf[..take]).await?;
        hasher.update(&buf[..take]);
        remaining -= take as u64;
    }
    Ok(hasher.finalize())
}
