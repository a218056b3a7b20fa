//! Local Cache Store: the durable on-device copy of captured records.
//!
//! One SQLite row per identity key. Writes go through single-statement
//! upserts so that the read-modify-write step of the merge rule is atomic
//! per key; overlapping capture tasks cannot lose an update here.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use thiserror::Error;

use crate::config::Config;
use crate::models::{Record, RecordBody};

/// The on-device store itself failed to read or write. Fatal for the
/// operation that hit it; callers surface this rather than swallow it.
#[derive(Debug, Error)]
#[error("local store failure: {0}")]
pub struct StoreError(#[from] sqlx::Error);

pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    /// Open (creating if missing) the SQLite database behind the store.
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let db_path = &config.db.path;

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .map_err(StoreError::from)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn get(&self, identity_key: &str) -> Result<Option<Record>, StoreError> {
        let row = sqlx::query(
            "SELECT identity_key, kind, title, url, markup, styled_markup, captured_at, remote_id \
             FROM records WHERE identity_key = ?",
        )
        .bind(identity_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_record).transpose()
    }

    /// Unconditional overwrite of the row for the record's identity key.
    pub async fn put(&self, record: &Record) -> Result<(), StoreError> {
        self.write(record, false).await?;
        Ok(())
    }

    /// Freshness-guarded write: the row is replaced only if the incoming
    /// capture is at least as recent as the stored one. Returns whether a
    /// write happened. This is the pipeline's merge rule, executed as one
    /// atomic statement.
    pub async fn put_if_fresher(&self, record: &Record) -> Result<bool, StoreError> {
        let rows = self.write(record, true).await?;
        Ok(rows > 0)
    }

    /// Update-only freshness merge: refresh an existing row with a fresher
    /// capture of the same key, keeping its remote id. Never inserts:
    /// a duplicate capture of a key this store has not seen writes nothing.
    /// Returns whether a row changed.
    pub async fn refresh_if_fresher(&self, record: &Record) -> Result<bool, StoreError> {
        let (url, markup, styled_markup) = match &record.body {
            RecordBody::Page { url } => (Some(url.as_str()), None, None),
            RecordBody::Snapshot {
                markup,
                styled_markup,
            } => (None, Some(markup.as_str()), Some(styled_markup.as_str())),
        };

        let result = sqlx::query(
            r#"
            UPDATE records SET
                kind = ?,
                title = ?,
                url = ?,
                markup = ?,
                styled_markup = ?,
                captured_at = ?,
                remote_id = COALESCE(?, remote_id)
            WHERE identity_key = ? AND captured_at < ?
            "#,
        )
        .bind(record.body.kind())
        .bind(&record.title)
        .bind(url)
        .bind(markup)
        .bind(styled_markup)
        .bind(record.captured_at.timestamp_millis())
        .bind(record.remote_id)
        .bind(&record.identity_key)
        .bind(record.captured_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn write(&self, record: &Record, guarded: bool) -> Result<u64, StoreError> {
        let (url, markup, styled_markup) = match &record.body {
            RecordBody::Page { url } => (Some(url.as_str()), None, None),
            RecordBody::Snapshot {
                markup,
                styled_markup,
            } => (None, Some(markup.as_str()), Some(styled_markup.as_str())),
        };

        let sql = if guarded {
            r#"
            INSERT INTO records (identity_key, kind, title, url, markup, styled_markup, captured_at, remote_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(identity_key) DO UPDATE SET
                kind = excluded.kind,
                title = excluded.title,
                url = excluded.url,
                markup = excluded.markup,
                styled_markup = excluded.styled_markup,
                captured_at = excluded.captured_at,
                remote_id = COALESCE(excluded.remote_id, records.remote_id)
            WHERE excluded.captured_at >= records.captured_at
            "#
        } else {
            r#"
            INSERT INTO records (identity_key, kind, title, url, markup, styled_markup, captured_at, remote_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(identity_key) DO UPDATE SET
                kind = excluded.kind,
                title = excluded.title,
                url = excluded.url,
                markup = excluded.markup,
                styled_markup = excluded.styled_markup,
                captured_at = excluded.captured_at,
                remote_id = excluded.remote_id
            "#
        };

        let result = sqlx::query(sql)
            .bind(&record.identity_key)
            .bind(record.body.kind())
            .bind(&record.title)
            .bind(url)
            .bind(markup)
            .bind(styled_markup)
            .bind(record.captured_at.timestamp_millis())
            .bind(record.remote_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// All records, newest first.
    pub async fn list_all(&self) -> Result<Vec<Record>, StoreError> {
        let rows = sqlx::query(
            "SELECT identity_key, kind, title, url, markup, styled_markup, captured_at, remote_id \
             FROM records ORDER BY captured_at DESC, identity_key ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Records the remote store has not acknowledged yet, oldest first so a
    /// resync pushes them in capture order.
    pub async fn local_only(&self) -> Result<Vec<Record>, StoreError> {
        let rows = sqlx::query(
            "SELECT identity_key, kind, title, url, markup, styled_markup, captured_at, remote_id \
             FROM records WHERE remote_id IS NULL ORDER BY captured_at ASC, identity_key ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    pub async fn delete_by_remote_id(&self, remote_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM records WHERE remote_id = ?")
            .bind(remote_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM records")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_record(row: sqlx::sqlite::SqliteRow) -> Result<Record, StoreError> {
    let kind: String = row.get("kind");
    let body = match kind.as_str() {
        "card" => RecordBody::Snapshot {
            markup: row.get::<Option<String>, _>("markup").unwrap_or_default(),
            styled_markup: row
                .get::<Option<String>, _>("styled_markup")
                .unwrap_or_default(),
        },
        // Rows predating the card kind are all page visits
        _ => RecordBody::Page {
            url: row.get::<Option<String>, _>("url").unwrap_or_default(),
        },
    };

    let captured_ms: i64 = row.get("captured_at");
    let captured_at = chrono::DateTime::from_timestamp_millis(captured_ms)
        .unwrap_or_else(chrono::Utc::now);

    Ok(Record {
        identity_key: row.get("identity_key"),
        title: row.get("title"),
        body,
        captured_at,
        remote_id: row.get("remote_id"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use chrono::{Duration, Utc};

    async fn temp_store() -> (tempfile::TempDir, LocalStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("trail.sqlite");
        migrate::run_migrations(&config).await.unwrap();
        (tmp, LocalStore::connect(&config).await.unwrap())
    }

    fn page(key: &str, title: &str, at: chrono::DateTime<Utc>) -> Record {
        Record {
            identity_key: key.to_string(),
            title: title.to_string(),
            body: RecordBody::Page {
                url: key.to_string(),
            },
            captured_at: at,
            remote_id: None,
        }
    }

    #[tokio::test]
    async fn put_overwrites_the_same_key() {
        let (_tmp, store) = temp_store().await;
        let t = Utc::now();
        store.put(&page("https://a.example", "one", t)).await.unwrap();
        store
            .put(&page("https://a.example", "two", t + Duration::seconds(1)))
            .await
            .unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "two");
    }

    #[tokio::test]
    async fn put_if_fresher_ignores_an_older_capture() {
        let (_tmp, store) = temp_store().await;
        let t = Utc::now();
        store
            .put_if_fresher(&page("https://a.example", "new", t))
            .await
            .unwrap();
        store
            .put_if_fresher(&page("https://a.example", "old", t - Duration::seconds(5)))
            .await
            .unwrap();

        let got = store.get("https://a.example").await.unwrap().unwrap();
        assert_eq!(got.title, "new");
    }

    #[tokio::test]
    async fn put_if_fresher_keeps_the_known_remote_id() {
        let (_tmp, store) = temp_store().await;
        let t = Utc::now();
        let mut first = page("https://a.example", "one", t);
        first.remote_id = Some(9);
        store.put_if_fresher(&first).await.unwrap();

        // A fresher capture without an id must not erase the id
        store
            .put_if_fresher(&page("https://a.example", "two", t + Duration::seconds(1)))
            .await
            .unwrap();

        let got = store.get("https://a.example").await.unwrap().unwrap();
        assert_eq!(got.title, "two");
        assert_eq!(got.remote_id, Some(9));
    }

    #[tokio::test]
    async fn refresh_if_fresher_never_inserts() {
        let (_tmp, store) = temp_store().await;
        let touched = store
            .refresh_if_fresher(&page("https://a.example", "A", Utc::now()))
            .await
            .unwrap();
        assert!(!touched);
        assert!(store.get("https://a.example").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn local_only_lists_unsynced_records_oldest_first() {
        let (_tmp, store) = temp_store().await;
        let t = Utc::now();
        store
            .put(&page("https://b.example", "B", t + Duration::seconds(1)))
            .await
            .unwrap();
        store.put(&page("https://a.example", "A", t)).await.unwrap();
        let mut synced = page("https://c.example", "C", t);
        synced.remote_id = Some(1);
        store.put(&synced).await.unwrap();

        let pending = store.local_only().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].identity_key, "https://a.example");
        assert_eq!(pending[1].identity_key, "https://b.example");
    }

    #[tokio::test]
    async fn snapshot_rows_round_trip_their_markup() {
        let (_tmp, store) = temp_store().await;
        let record = Record {
            identity_key: "card:abc".to_string(),
            title: "card".to_string(),
            body: RecordBody::Snapshot {
                markup: "<p>x</p>".to_string(),
                styled_markup: "<article style=\"color:red;\"><p>x</p></article>".to_string(),
            },
            captured_at: Utc::now(),
            remote_id: None,
        };
        store.put(&record).await.unwrap();

        let got = store.get("card:abc").await.unwrap().unwrap();
        match got.body {
            RecordBody::Snapshot {
                markup,
                styled_markup,
            } => {
                assert_eq!(markup, "<p>x</p>");
                assert!(styled_markup.contains("color:red"));
            }
            other => panic!("expected snapshot body, got {:?}", other),
        }
    }
}
