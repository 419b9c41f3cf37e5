use crate::db::*;
use crate::types::FileId;
use tempfile::NamedTempFile;

mod migrations;

async fn temp_db() -> (NamedTempFile, Database) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::open(temp_file.path()).await.unwrap();
    (temp_file, db)
}

fn sample_file(subject: &str) -> NewFile {
    NewFile {
        poster: "poster <poster@example.com>".to_string(),
        date: 1_700_000_000,
        subject: subject.to_string(),
        groups: vec![
            "alt.binaries.test".to_string(),
            "alt.binaries.misc".to_string(),
        ],
    }
}

fn sample_segments(file_tag: &str, total: i64) -> Vec<NewSegment> {
    (1..=total)
        .map(|part| NewSegment {
            message_id: format!("{}-part{}@example.com", file_tag, part),
            bytes: 768_000,
            part,
            total,
        })
        .collect()
}

/// Insert a file with `total` segments and return its id
async fn seed_file(db: &Database, name: &str, total: i64) -> FileId {
    let subject = format!("[1/1] - \"{}\" yEnc (1/{})", name, total);
    db.create_file_with_segments(&sample_file(&subject), &sample_segments(name, total))
        .await
        .unwrap()
}
