use super::*;

#[tokio::test]
async fn test_database_creation() {
    let (_temp_file, db) = temp_db().await;

    let mut conn = db.pool.acquire().await.unwrap();

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(&mut *conn)
            .await
            .unwrap();

    assert!(tables.contains(&"files".to_string()));
    assert!(tables.contains(&"segments".to_string()));
    assert!(tables.contains(&"schema_version".to_string()));

    drop(conn);
    db.close().await;
}

#[tokio::test]
async fn test_reopen_keeps_data_and_does_not_remigrate() {
    let temp_file = NamedTempFile::new().unwrap();

    let db = Database::open(temp_file.path()).await.unwrap();
    let file_id = seed_file(&db, "keep.bin", 2).await;
    db.close().await;

    let db = Database::open(temp_file.path()).await.unwrap();
    let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_version")
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(versions, vec![1]);

    let segments = db.segments_for_file(file_id, false).await.unwrap();
    assert_eq!(segments.len(), 2);

    db.close().await;
}

#[tokio::test]
async fn test_open_job_requires_existing_store() {
    let dir = tempfile::tempdir().unwrap();

    let err = Database::open_job(dir.path()).await.err().unwrap();
    assert!(matches!(err, crate::Error::JobDirectory { .. }));

    let missing = dir.path().join("nope");
    let err = Database::open_job(&missing).await.err().unwrap();
    assert!(matches!(err, crate::Error::JobDirectory { .. }));

    let db = Database::open(&dir.path().join(JOB_DB_NAME)).await.unwrap();
    db.close().await;

    let db = Database::open_job(dir.path()).await.unwrap();
    db.close().await;
}

#[tokio::test]
async fn test_range_check_constraint() {
    let (_temp_file, db) = temp_db().await;
    let file_id = seed_file(&db, "check.bin", 1).await;

    let result = sqlx::query(
        "UPDATE segments SET byte_begin = 10, byte_end = 5 WHERE file_id = ? AND part = 1",
    )
    .bind(file_id)
    .execute(db.pool())
    .await;
    assert!(result.is_err(), "begin > end must be rejected by the schema");

    db.close().await;
}
