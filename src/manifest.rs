//! NZB manifest ingest: seeds a fresh job store
//!
//! Each file of the manifest is written together with all of its segments in a
//! single transaction, so a manifest that fails halfway leaves only whole files
//! behind.

use crate::db::{Database, JOB_DB_NAME, NewFile, NewSegment};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// What an ingest added to the store
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestCounts {
    /// Files created
    pub files: u64,
    /// Segments created
    pub segments: u64,
}

/// Parse NZB XML and store its files and segments
pub async fn ingest_manifest(db: &Database, xml: &str) -> Result<IngestCounts> {
    let nzb = parse_manifest(xml)?;
    store_manifest(db, &nzb).await
}

fn parse_manifest(xml: &str) -> Result<nntp_rs::Nzb> {
    let nzb = nntp_rs::parse_nzb(xml)
        .map_err(|e| Error::InvalidNzb(format!("Failed to parse NZB: {}", e)))?;

    nzb.validate()
        .map_err(|e| Error::InvalidNzb(format!("NZB validation failed: {}", e)))?;

    Ok(nzb)
}

async fn store_manifest(db: &Database, nzb: &nntp_rs::Nzb) -> Result<IngestCounts> {
    let mut counts = IngestCounts::default();
    for file in &nzb.files {
        let total = file.segments.len() as i64;
        let new_file = NewFile {
            poster: file.poster.clone(),
            date: file.date,
            subject: file.subject.clone(),
            groups: file.groups.clone(),
        };
        let segments: Vec<NewSegment> = file
            .segments
            .iter()
            .map(|segment| NewSegment {
                message_id: segment.message_id.clone(),
                bytes: segment.bytes as i64,
                part: segment.number as i64,
                total,
            })
            .collect();

        let file_id = db.create_file_with_segments(&new_file, &segments).await?;
        tracing::debug!(
            file_id = file_id.get(),
            subject = %file.subject,
            segments = total,
            "Stored manifest file"
        );

        counts.files += 1;
        counts.segments += segments.len() as u64;
    }

    tracing::info!(
        files = counts.files,
        segments = counts.segments,
        "Manifest ingested"
    );
    Ok(counts)
}

/// Directory a job is placed in when none is given: `<manifest>_content`
pub fn default_target_dir(manifest: &Path) -> PathBuf {
    let mut name = manifest.as_os_str().to_os_string();
    name.push("_content");
    PathBuf::from(name)
}

/// Create a new job directory for `manifest` and seed its store
///
/// Refuses to touch an existing target directory.
pub async fn start_job(manifest: &Path, target_dir: Option<PathBuf>) -> Result<(PathBuf, IngestCounts)> {
    let target_dir = target_dir.unwrap_or_else(|| default_target_dir(manifest));

    if tokio::fs::try_exists(&target_dir).await? {
        return Err(Error::JobDirectory {
            path: target_dir,
            reason: "target already exists".to_string(),
        });
    }

    let xml = tokio::fs::read_to_string(manifest).await?;
    // A broken manifest leaves no directory behind
    let nzb = parse_manifest(&xml)?;

    tokio::fs::create_dir_all(&target_dir).await?;
    let db = Database::open(&target_dir.join(JOB_DB_NAME)).await?;
    let counts = store_manifest(&db, &nzb).await;
    db.close().await;

    Ok((target_dir, counts?))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE_NZB: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nzb PUBLIC "-//newzBin//DTD NZB 1.1//EN" "http://www.newzbin.com/DTD/nzb/nzb-1.1.dtd">
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
  <file poster="poster@example.com" date="1700000000" subject="Holiday [1/2] - &quot;photos.rar&quot; yEnc (1/2)">
    <groups>
      <group>alt.binaries.pictures</group>
      <group>alt.binaries.test</group>
    </groups>
    <segments>
      <segment bytes="1024" number="2">photos.2@example.com</segment>
      <segment bytes="1024" number="1">photos.1@example.com</segment>
    </segments>
  </file>
  <file poster="poster@example.com" date="1700000001" subject="no quoted name here">
    <groups>
      <group>alt.binaries.test</group>
    </groups>
    <segments>
      <segment bytes="512" number="1">single@example.com</segment>
    </segments>
  </file>
</nzb>"#;

    async fn temp_db(dir: &TempDir) -> Database {
        Database::open(&dir.path().join(JOB_DB_NAME)).await.unwrap()
    }

    #[tokio::test]
    async fn ingest_stores_files_and_segments() {
        let dir = TempDir::new().unwrap();
        let db = temp_db(&dir).await;

        let counts = ingest_manifest(&db, SAMPLE_NZB).await.unwrap();
        assert_eq!(counts, IngestCounts { files: 2, segments: 3 });

        let files = db.list_files().await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].guessed_filename, "photos.rar");
        assert_eq!(files[0].group_list(), vec!["alt.binaries.pictures", "alt.binaries.test"]);
        assert_eq!(files[0].date, 1_700_000_000);
        assert_eq!(files[1].guessed_filename, "");

        let segments = db.segments_for_file(files[0].id, false).await.unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].part, 1);
        assert_eq!(segments[0].message_id, "photos.1@example.com");
        assert!(segments.iter().all(|s| s.total == 2 && s.tries == 0 && !s.complete));
    }

    #[tokio::test]
    async fn malformed_manifest_is_rejected() {
        let dir = TempDir::new().unwrap();
        let db = temp_db(&dir).await;

        let err = ingest_manifest(&db, "<nzb><file></nzb>").await.unwrap_err();
        assert!(matches!(err, Error::InvalidNzb(_)));
        assert!(db.list_files().await.unwrap().is_empty());
    }

    #[test]
    fn default_target_appends_content_suffix() {
        assert_eq!(
            default_target_dir(Path::new("/downloads/show.nzb")),
            PathBuf::from("/downloads/show.nzb_content")
        );
    }

    #[tokio::test]
    async fn start_job_refuses_an_existing_target() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("job.nzb");
        std::fs::write(&manifest, SAMPLE_NZB).unwrap();

        let (target, counts) = start_job(&manifest, None).await.unwrap();
        assert_eq!(target, dir.path().join("job.nzb_content"));
        assert_eq!(counts.segments, 3);
        assert!(target.join(JOB_DB_NAME).is_file());

        let err = start_job(&manifest, None).await.unwrap_err();
        assert!(matches!(err, Error::JobDirectory { .. }));
    }

    #[tokio::test]
    async fn start_job_with_broken_manifest_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("broken.nzb");
        std::fs::write(&manifest, "not xml at all <").unwrap();
        let target = dir.path().join("out");

        assert!(start_job(&manifest, Some(target.clone())).await.is_err());
        assert!(!target.exists());
    }
}
