use helix_test_utils::{create_test_db, drop_test_db};

const EXPECTED_TABLES: &[&str] = &["jobs", "tasks", "artifacts", "prompts", "system_events"];

#[tokio::test]
async fn migrations_create_expected_tables() {
    let (pool, db_name) = create_test_db().await;

    for table in EXPECTED_TABLES {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = $1)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists, "expected table {table} to exist after migrations");
    }

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn table_counts_start_at_zero() {
    let (pool, db_name) = create_test_db().await;

    let counts = helix_db::pool::table_counts(&pool).await.unwrap();
    assert_eq!(counts.len(), EXPECTED_TABLES.len());
    for (_, count) in counts {
        assert_eq!(count, 0);
    }

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let (pool, db_name) = create_test_db().await;

    helix_db::pool::run_migrations(&pool, &helix_db::pool::default_migrations_path())
        .await
        .expect("re-running migrations against an up-to-date database should be a no-op");

    drop_test_db(&db_name).await;
}
