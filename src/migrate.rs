use anyhow::Result;
use sqlx::SqlitePool;

/// Create the session tables. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per (session, verbatim query)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workflow_cache (
            session_id TEXT NOT NULL,
            query TEXT NOT NULL,
            outcome TEXT NOT NULL,
            output_json TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (session_id, query)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_workflow_cache_recent ON workflow_cache(session_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
