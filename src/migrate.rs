use anyhow::Result;

use crate::config::Config;
use crate::store::LocalStore;

/// Create the schema and reconcile legacy data. Idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let store = LocalStore::connect(config).await?;
    let pool = store.pool();

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            identity_key TEXT NOT NULL,
            kind TEXT NOT NULL DEFAULT 'page',
            title TEXT NOT NULL DEFAULT '',
            url TEXT,
            markup TEXT,
            styled_markup TEXT,
            captured_at INTEGER NOT NULL,
            remote_id INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The uniqueness index arrived after the table did. Databases written
    // before it may hold several rows per identity key, so reconcile first:
    // within each key, only the latest capture survives. The index creation
    // would otherwise fail, which is also why it is probed rather than
    // blindly re-run.
    let unique_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='index' AND name='idx_records_identity_key'",
    )
    .fetch_one(pool)
    .await?;

    if !unique_exists {
        sqlx::query(
            r#"
            DELETE FROM records WHERE EXISTS (
                SELECT 1 FROM records AS newer
                WHERE newer.identity_key = records.identity_key
                  AND (newer.captured_at > records.captured_at
                       OR (newer.captured_at = records.captured_at
                           AND newer.rowid > records.rowid))
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE UNIQUE INDEX idx_records_identity_key ON records(identity_key)")
            .execute(pool)
            .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_captured_at ON records(captured_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_remote_id ON records(remote_id)")
        .execute(pool)
        .await?;

    store.close().await;
    Ok(())
}
