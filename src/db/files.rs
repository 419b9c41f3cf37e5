//! File records and manifest-ingest inserts.

use crate::error::DatabaseError;
use crate::types::FileId;
use crate::{Error, Result};
use regex::Regex;
use sqlx::SqliteConnection;
use std::sync::OnceLock;

use super::{Database, FileRecord, NewFile, NewSegment};

/// Guess a filename from a subject line
///
/// Takes the last double-quoted token, which is where posting tools put the
/// name (`[01/10] - "file.part01.rar" yEnc (1/50)`). Returns an empty string
/// when the subject carries no quoted token.
pub fn guess_filename(subject: &str) -> String {
    static FILENAME_RE: OnceLock<Option<Regex>> = OnceLock::new();

    FILENAME_RE
        .get_or_init(|| Regex::new(r#"^.*"(?P<filename>.*)".*$"#).ok())
        .as_ref()
        .and_then(|re| re.captures(subject))
        .and_then(|caps| caps.name("filename"))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

impl Database {
    /// Insert a file record, guessing its filename from the subject
    pub async fn create_file(&self, file: &NewFile) -> Result<FileId> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;
        Self::insert_file(&mut *conn, file).await
    }

    /// Insert a file and all of its segments in one transaction
    ///
    /// Either the whole file lands in the store or none of it does.
    pub async fn create_file_with_segments(
        &self,
        file: &NewFile,
        segments: &[NewSegment],
    ) -> Result<FileId> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let file_id = Self::insert_file(&mut *tx, file).await?;
        for segment in segments {
            Self::insert_segment(&mut *tx, file_id, segment).await?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit file {}: {}",
                file_id, e
            )))
        })?;

        Ok(file_id)
    }

    /// Get a file by ID
    pub async fn get_file(&self, id: FileId) -> Result<Option<FileRecord>> {
        sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT id, poster, date, subject, guessed_filename, groups
            FROM files
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get file: {}",
                e
            )))
        })
    }

    /// List all files in insertion order
    pub async fn list_files(&self) -> Result<Vec<FileRecord>> {
        sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT id, poster, date, subject, guessed_filename, groups
            FROM files
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list files: {}",
                e
            )))
        })
    }

    pub(super) async fn insert_file(conn: &mut SqliteConnection, file: &NewFile) -> Result<FileId> {
        let guessed = guess_filename(&file.subject);

        let result = sqlx::query(
            r#"
            INSERT INTO files (poster, date, subject, guessed_filename, groups)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&file.poster)
        .bind(file.date)
        .bind(&file.subject)
        .bind(&guessed)
        .bind(file.groups.join(";"))
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert file: {}",
                e
            )))
        })?;

        Ok(FileId(result.last_insert_rowid()))
    }
}
