//! Segment claims, outcomes and progress queries.
//!
//! A segment moves through three states: pending (`complete = 0`,
//! `tries < max_tries`), complete, or exhausted (`complete = 0`,
//! `tries >= max_tries`). While a worker holds it, `claimed_at` is set and no
//! other claimer can take it until the claim is released or its lease expires.

use crate::error::DatabaseError;
use crate::types::{FileId, StoreSummary};
use crate::{Error, Result};
use sqlx::SqliteConnection;
use std::time::Duration;

use super::{Database, NewSegment, Segment};

impl Database {
    /// Insert an incomplete segment with no attempts and empty decoded fields
    pub async fn create_segment(&self, file_id: FileId, segment: &NewSegment) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;
        Self::insert_segment(&mut *conn, file_id, segment).await
    }

    pub(super) async fn insert_segment(
        conn: &mut SqliteConnection,
        file_id: FileId,
        segment: &NewSegment,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO segments (file_id, part, message_id, bytes, total)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(file_id)
        .bind(segment.part)
        .bind(&segment.message_id)
        .bind(segment.bytes)
        .bind(segment.total)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert segment {}/{}: {}",
                file_id, segment.part, e
            )))
        })?;

        Ok(())
    }

    /// Atomically claim up to `limit` eligible segments
    ///
    /// Eligible means incomplete, fewer than `max_tries` attempts, and not held
    /// by a claim younger than `lease`. Segments come back least-tried first,
    /// then by file and part. The select and the claim happen in a single
    /// statement, so concurrent callers never receive the same segment.
    pub async fn claim_eligible(
        &self,
        limit: usize,
        max_tries: u32,
        lease: Duration,
    ) -> Result<Vec<Segment>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now = chrono::Utc::now().timestamp();
        let expired_before = now - lease.as_secs() as i64;

        let mut claimed = sqlx::query_as::<_, Segment>(
            r#"
            UPDATE segments
            SET claimed_at = ?
            WHERE rowid IN (
                SELECT rowid FROM segments
                WHERE complete = 0
                  AND tries < ?
                  AND (claimed_at IS NULL OR claimed_at <= ?)
                ORDER BY tries ASC, file_id ASC, part ASC
                LIMIT ?
            )
            RETURNING
                file_id, part, message_id, bytes, filename, total,
                byte_begin, byte_end, pcrc32, tries, errors, complete, claimed_at
            "#,
        )
        .bind(now)
        .bind(max_tries as i64)
        .bind(expired_before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to claim segments: {}",
                e
            )))
        })?;

        // RETURNING row order is unspecified
        claimed.sort_by_key(|s| (s.tries, s.file_id, s.part));

        Ok(claimed)
    }

    /// Mark a segment decoded and written, and drop its claim
    pub async fn record_success(
        &self,
        file_id: FileId,
        part: i64,
        filename: &str,
        begin: u64,
        end: u64,
        checksum: u32,
    ) -> Result<()> {
        if filename.is_empty() || begin == 0 || begin > end {
            return Err(Error::Database(DatabaseError::QueryFailed(format!(
                "Refusing to complete segment {}/{} with name {:?} and range [{}, {}]",
                file_id, part, filename, begin, end
            ))));
        }

        let result = sqlx::query(
            r#"
            UPDATE segments
            SET filename = ?, byte_begin = ?, byte_end = ?, pcrc32 = ?,
                complete = 1, claimed_at = NULL
            WHERE file_id = ? AND part = ?
            "#,
        )
        .bind(filename)
        .bind(begin as i64)
        .bind(end as i64)
        .bind(checksum)
        .bind(file_id)
        .bind(part)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record success for segment {}/{}: {}",
                file_id, part, e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "segment {}/{}",
                file_id, part
            ))));
        }

        Ok(())
    }

    /// Count a failed attempt against a segment and drop its claim
    pub async fn record_failure(&self, file_id: FileId, part: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE segments
            SET tries = tries + 1, errors = errors + 1, claimed_at = NULL
            WHERE file_id = ? AND part = ?
            "#,
        )
        .bind(file_id)
        .bind(part)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record failure for segment {}/{}: {}",
                file_id, part, e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "segment {}/{}",
                file_id, part
            ))));
        }

        Ok(())
    }

    /// Drop a claim without counting an attempt
    pub async fn release_claim(&self, file_id: FileId, part: i64) -> Result<()> {
        sqlx::query("UPDATE segments SET claimed_at = NULL WHERE file_id = ? AND part = ?")
            .bind(file_id)
            .bind(part)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to release claim on segment {}/{}: {}",
                    file_id, part, e
                )))
            })?;

        Ok(())
    }

    /// Drop every claim in the store, returning how many were held
    ///
    /// Called when a job is reopened: whoever held those claims is gone.
    pub async fn release_claims(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE segments SET claimed_at = NULL WHERE claimed_at IS NOT NULL")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to release claims: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }

    /// Put a segment back to its freshly ingested state so it is fetched again
    ///
    /// The error count is kept as history.
    pub async fn reset_segment(&self, file_id: FileId, part: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE segments
            SET complete = 0, tries = 0, filename = '', byte_begin = NULL,
                byte_end = NULL, pcrc32 = NULL, claimed_at = NULL
            WHERE file_id = ? AND part = ?
            "#,
        )
        .bind(file_id)
        .bind(part)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to reset segment {}/{}: {}",
                file_id, part, e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "segment {}/{}",
                file_id, part
            ))));
        }

        Ok(())
    }

    /// Files with at least one complete segment, with one of their decoded names
    pub async fn completed_files(&self) -> Result<Vec<(FileId, String)>> {
        sqlx::query_as::<_, (FileId, String)>(
            r#"
            SELECT file_id, MIN(filename)
            FROM segments
            WHERE complete = 1 AND filename != ''
            GROUP BY file_id
            ORDER BY file_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list completed files: {}",
                e
            )))
        })
    }

    /// Segments of one file ordered by part, optionally only the complete ones
    pub async fn segments_for_file(
        &self,
        file_id: FileId,
        complete_only: bool,
    ) -> Result<Vec<Segment>> {
        sqlx::query_as::<_, Segment>(
            r#"
            SELECT
                file_id, part, message_id, bytes, filename, total,
                byte_begin, byte_end, pcrc32, tries, errors, complete, claimed_at
            FROM segments
            WHERE file_id = ? AND (complete = 1 OR ? = 0)
            ORDER BY part ASC
            "#,
        )
        .bind(file_id)
        .bind(complete_only)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get segments for file {}: {}",
                file_id, e
            )))
        })
    }

    /// Get a single segment
    pub async fn get_segment(&self, file_id: FileId, part: i64) -> Result<Option<Segment>> {
        sqlx::query_as::<_, Segment>(
            r#"
            SELECT
                file_id, part, message_id, bytes, filename, total,
                byte_begin, byte_end, pcrc32, tries, errors, complete, claimed_at
            FROM segments
            WHERE file_id = ? AND part = ?
            "#,
        )
        .bind(file_id)
        .bind(part)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get segment {}/{}: {}",
                file_id, part, e
            )))
        })
    }

    /// Progress counters; `max_tries` decides which incomplete segments count as exhausted
    pub async fn summary(&self, max_tries: u32) -> Result<StoreSummary> {
        let (files,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count files: {}",
                    e
                )))
            })?;

        let (segments, complete, exhausted): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(complete = 1), 0),
                COALESCE(SUM(complete = 0 AND tries >= ?), 0)
            FROM segments
            "#,
        )
        .bind(max_tries as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to summarize segments: {}",
                e
            )))
        })?;

        Ok(StoreSummary {
            files: files as u64,
            segments: segments as u64,
            complete: complete as u64,
            pending: (segments - complete - exhausted) as u64,
            exhausted: exhausted as u64,
        })
    }
}
