//! Remote Store Client: the HTTP/JSON contract of the history service.
//!
//! Every failure mode (unreachable host, non-2xx status, undecodable body)
//! collapses into the single [`RemoteUnavailable`] error. Nothing here throws
//! past the client boundary, and nothing retries: the coordinator owns the
//! fallback behavior.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::models::{Record, RecordBody};

/// The remote store could not be reached or answered unusably. Callers treat
/// this as "remote state unknown" and recover locally.
#[derive(Debug, Clone, Error)]
#[error("remote store unavailable: {reason}")]
pub struct RemoteUnavailable {
    pub reason: String,
}

impl RemoteUnavailable {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for RemoteUnavailable {
    fn from(e: reqwest::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// Seam between the coordinator and the history service. The production
/// implementation is [`HttpRemote`]; tests script their own.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whether a record with this identity key already exists remotely.
    async fn exists(&self, identity_key: &str) -> Result<bool, RemoteUnavailable>;

    /// Commit a record; on success the returned copy carries the assigned id.
    async fn create(&self, record: &Record) -> Result<Record, RemoteUnavailable>;

    async fn list_all(&self) -> Result<Vec<Record>, RemoteUnavailable>;

    async fn delete_all(&self) -> Result<(), RemoteUnavailable>;

    async fn delete_one(&self, id: i64) -> Result<(), RemoteUnavailable>;
}

#[derive(Deserialize)]
struct ExistsResponse {
    exists: bool,
}

#[derive(Serialize)]
struct HistoryBody<'a> {
    url: &'a str,
    title: &'a str,
    timestamp: String,
}

#[derive(Deserialize)]
struct HistoryRow {
    id: i64,
    url: String,
    #[serde(default)]
    title: Option<String>,
    timestamp: String,
}

#[derive(Serialize)]
struct CollectionBody<'a> {
    html: &'a str,
    styled_html: &'a str,
}

#[derive(Deserialize)]
struct CreatedId {
    id: i64,
}

pub struct HttpRemote {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        // Deliberately no request timeout: a hung call stalls only its own
        // capture task, and cutting it short would turn slow-but-successful
        // commits into duplicates on retry paths.
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: config.remote.base_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn expect_ok(resp: reqwest::Response) -> Result<reqwest::Response, RemoteUnavailable> {
    let status = resp.status();
    if !status.is_success() {
        return Err(RemoteUnavailable::new(format!("HTTP {}", status)));
    }
    Ok(resp)
}

fn decode_err(e: reqwest::Error) -> RemoteUnavailable {
    RemoteUnavailable::new(format!("malformed response body: {}", e))
}

fn row_to_record(row: HistoryRow) -> Result<Record, RemoteUnavailable> {
    let captured_at = chrono::DateTime::parse_from_rfc3339(&row.timestamp)
        .map_err(|e| RemoteUnavailable::new(format!("malformed timestamp '{}': {}", row.timestamp, e)))?
        .with_timezone(&chrono::Utc);

    Ok(Record {
        identity_key: row.url.clone(),
        title: row.title.unwrap_or_else(|| row.url.clone()),
        body: RecordBody::Page { url: row.url },
        captured_at,
        remote_id: Some(row.id),
    })
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn exists(&self, identity_key: &str) -> Result<bool, RemoteUnavailable> {
        let resp = self
            .http
            .get(self.url("/histories/check"))
            .query(&[("url", identity_key)])
            .send()
            .await?;
        let body: ExistsResponse = expect_ok(resp).await?.json().await.map_err(decode_err)?;
        Ok(body.exists)
    }

    async fn create(&self, record: &Record) -> Result<Record, RemoteUnavailable> {
        let id = match &record.body {
            RecordBody::Page { url } => {
                let resp = self
                    .http
                    .post(self.url("/histories"))
                    .json(&HistoryBody {
                        url,
                        title: &record.title,
                        timestamp: record.captured_at.to_rfc3339(),
                    })
                    .send()
                    .await?;
                let row: HistoryRow = expect_ok(resp).await?.json().await.map_err(decode_err)?;
                row.id
            }
            RecordBody::Snapshot {
                markup,
                styled_markup,
            } => {
                let resp = self
                    .http
                    .post(self.url("/collections/add"))
                    .json(&CollectionBody {
                        html: markup,
                        styled_html: styled_markup,
                    })
                    .send()
                    .await?;
                let created: CreatedId = expect_ok(resp).await?.json().await.map_err(decode_err)?;
                created.id
            }
        };

        let mut committed = record.clone();
        committed.remote_id = Some(id);
        Ok(committed)
    }

    async fn list_all(&self) -> Result<Vec<Record>, RemoteUnavailable> {
        let resp = self.http.get(self.url("/histories")).send().await?;
        let rows: Vec<HistoryRow> = expect_ok(resp).await?.json().await.map_err(decode_err)?;
        rows.into_iter().map(row_to_record).collect()
    }

    async fn delete_all(&self) -> Result<(), RemoteUnavailable> {
        let resp = self.http.delete(self.url("/histories")).send().await?;
        expect_ok(resp).await?;
        Ok(())
    }

    async fn delete_one(&self, id: i64) -> Result<(), RemoteUnavailable> {
        let resp = self
            .http
            .delete(self.url(&format!("/histories/{}", id)))
            .send()
            .await?;
        expect_ok(resp).await?;
        Ok(())
    }
}
