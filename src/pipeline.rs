//! Synchronization Coordinator: the orchestrator of the capture pipeline.
//!
//! Per captured event the coordinator runs the state machine
//! Extracted → Checked → Committed | LocalOnly → Done:
//! extract a candidate record, ask the remote store whether the key already
//! exists, commit remotely on a miss, and fall back to the local cache when
//! the remote is unavailable. Remote failures are absorbed here and converted
//! into the fallback path; only a local-store failure propagates, because it
//! means the record is lost.
//!
//! Events on the same identity key are serialized through an in-flight guard
//! map, so two rapid captures of one page cannot race between the existence
//! check and the write. Events on distinct keys interleave freely at their
//! I/O suspension points.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::Config;
use crate::events::CaptureEvent;
use crate::extract::Extractor;
use crate::models::{Record, RecordBody};
use crate::remote::{HttpRemote, RemoteStore, RemoteUnavailable};
use crate::store::{LocalStore, StoreError};

/// Terminal state of one capture event.
#[derive(Debug)]
pub enum CaptureOutcome {
    /// Extraction miss; nothing was written anywhere.
    Skipped,
    /// The store already holds this key; no new record was created.
    Duplicate,
    /// Committed remotely and mirrored into the local cache.
    Committed(Record),
    /// Remote unavailable; the record is held in the local cache until a
    /// resync pushes it.
    LocalOnly(Record),
}

/// Outcome of a bulk clear. Both sides are always reported; a one-sided
/// failure must never read as success.
#[derive(Debug)]
pub struct ClearReport {
    pub remote: Result<(), RemoteUnavailable>,
    pub local: Result<(), StoreError>,
}

impl ClearReport {
    pub fn is_complete(&self) -> bool {
        self.remote.is_ok() && self.local.is_ok()
    }
}

/// Outcome of a resync sweep over local-only records.
#[derive(Debug, Default)]
pub struct ResyncReport {
    /// Created on the remote store during this sweep.
    pub pushed: u64,
    /// Already present remotely; only the id was adopted locally.
    pub acquired: u64,
    /// Left local-only for a later sweep.
    pub failed: u64,
}

pub struct Coordinator {
    extractor: Extractor,
    local: LocalStore,
    remote: Box<dyn RemoteStore>,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Coordinator {
    pub fn new(extractor: Extractor, local: LocalStore, remote: Box<dyn RemoteStore>) -> Self {
        Self {
            extractor,
            local,
            remote,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let local = LocalStore::connect(config).await?;
        let remote = HttpRemote::new(config)?;
        Ok(Self::new(
            Extractor::from_config(config),
            local,
            Box::new(remote),
        ))
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    /// Run one capture event through the state machine. Exactly-once: no
    /// retries are scheduled on any path.
    pub async fn handle_event(&self, event: &CaptureEvent) -> Result<CaptureOutcome, StoreError> {
        // Extracted
        let Some(record) = self.extractor.extract(event) else {
            return Ok(CaptureOutcome::Skipped);
        };

        let key = record.identity_key.clone();
        let guard = self.lock_key(&key).await;
        let outcome = self.check_and_commit(record).await;
        drop(guard);
        self.release_key_if_idle(&key).await;
        outcome
    }

    async fn check_and_commit(&self, record: Record) -> Result<CaptureOutcome, StoreError> {
        // Checked. The remote store is the source of truth for existence of
        // page visits; a failed check means "state unknown", so prefer
        // attempting the create. Cards are keyed by content hash and have no
        // remote existence endpoint, so their duplicate check is local.
        let duplicate = match &record.body {
            RecordBody::Page { .. } => match self.remote.exists(&record.identity_key).await {
                Ok(exists) => exists,
                Err(e) => {
                    tracing::warn!(key = %record.identity_key, error = %e,
                        "existence check failed, attempting create");
                    false
                }
            },
            RecordBody::Snapshot { .. } => self.local.get(&record.identity_key).await?.is_some(),
        };
        if duplicate {
            // The remote copy stays the record of existence, but the fresher
            // capture's payload must survive (monotonic freshness). Update-only:
            // a key this cache has never seen writes nothing at all.
            if self.local.refresh_if_fresher(&record).await? {
                tracing::debug!(key = %record.identity_key, "refreshed local copy of duplicate");
            }
            return Ok(CaptureOutcome::Duplicate);
        }

        // Committed | LocalOnly
        match self.remote.create(&record).await {
            Ok(committed) => {
                self.local.put_if_fresher(&committed).await?;
                Ok(CaptureOutcome::Committed(committed))
            }
            Err(e) => {
                tracing::warn!(key = %record.identity_key, error = %e,
                    "remote commit failed, caching locally");
                // Merge rule: the freshness-guarded upsert writes the
                // provisional record if the key is absent, and keeps the
                // later capture if it is present, in one atomic statement.
                self.local.put_if_fresher(&record).await?;
                Ok(CaptureOutcome::LocalOnly(record))
            }
        }
    }

    async fn lock_key(&self, key: &str) -> OwnedMutexGuard<()> {
        let cell = {
            let mut map = self.inflight.lock().await;
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        cell.lock_owned().await
    }

    /// Drop the guard cell once no other task holds or awaits it, keeping
    /// the in-flight map bounded by concurrency rather than by key history.
    async fn release_key_if_idle(&self, key: &str) {
        let mut map = self.inflight.lock().await;
        if let Some(cell) = map.get(key) {
            if Arc::strong_count(cell) == 1 {
                map.remove(key);
            }
        }
    }

    /// The canonical view: the remote listing when available, merged with
    /// local-only records; the local cache alone when the remote is down.
    /// One record per identity key, fresher capture wins, newest first.
    pub async fn canonical_view(&self) -> Result<Vec<Record>, StoreError> {
        let local = self.local.list_all().await?;

        let mut by_key: HashMap<String, Record> = HashMap::new();
        match self.remote.list_all().await {
            Ok(remote_records) => {
                for record in remote_records {
                    merge_into(&mut by_key, record);
                }
                for record in local {
                    merge_into(&mut by_key, record);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "remote listing unavailable, showing local cache only");
                for record in local {
                    merge_into(&mut by_key, record);
                }
            }
        }

        let mut view: Vec<Record> = by_key.into_values().collect();
        view.sort_by(|a, b| {
            b.captured_at
                .cmp(&a.captured_at)
                .then_with(|| a.identity_key.cmp(&b.identity_key))
        });
        Ok(view)
    }

    /// Bulk clear: both stores, both outcomes surfaced. Not part of the
    /// event-driven path.
    pub async fn bulk_clear(&self) -> ClearReport {
        let remote = self.remote.delete_all().await;
        if let Err(ref e) = remote {
            tracing::warn!(error = %e, "remote clear failed");
        }
        let local = self.local.clear().await;
        ClearReport { remote, local }
    }

    /// Delete one committed record from both stores. User-triggered, so
    /// remote failure is surfaced instead of absorbed.
    pub async fn delete_record(&self, remote_id: i64) -> Result<bool, RemoteUnavailable> {
        self.remote.delete_one(remote_id).await?;
        match self.local.delete_by_remote_id(remote_id).await {
            Ok(removed) => Ok(removed),
            Err(e) => {
                // Remote side is already gone; report it so the caller knows
                // the local cache needs reconciliation
                tracing::error!(error = %e, "record deleted remotely but not locally");
                Err(RemoteUnavailable {
                    reason: format!("local cleanup failed after remote delete: {}", e),
                })
            }
        }
    }

    /// Push local-only records to the remote store. Page visits are first
    /// reconciled against the remote listing so records the remote already
    /// holds adopt their id without a duplicate create. Partial progress is
    /// fine; whatever fails stays local-only for the next sweep.
    pub async fn resync(&self) -> Result<ResyncReport, StoreError> {
        let pending = self.local.local_only().await?;
        let mut report = ResyncReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        let remote_ids: HashMap<String, i64> = match self.remote.list_all().await {
            Ok(records) => records
                .into_iter()
                .filter_map(|r| r.remote_id.map(|id| (r.identity_key, id)))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "remote listing unavailable, trying direct creates");
                HashMap::new()
            }
        };

        for mut record in pending {
            if let Some(id) = remote_ids.get(&record.identity_key) {
                record.remote_id = Some(*id);
                self.local.put_if_fresher(&record).await?;
                report.acquired += 1;
                continue;
            }
            match self.remote.create(&record).await {
                Ok(committed) => {
                    self.local.put_if_fresher(&committed).await?;
                    report.pushed += 1;
                }
                Err(e) => {
                    tracing::warn!(key = %record.identity_key, error = %e, "resync push failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

fn merge_into(by_key: &mut HashMap<String, Record>, record: Record) {
    match by_key.get(&record.identity_key) {
        None => {
            by_key.insert(record.identity_key.clone(), record);
        }
        Some(existing) => {
            // Fresher capture wins; on a tie prefer the id-bearing copy
            let replace = record.captured_at > existing.captured_at
                || (record.captured_at == existing.captured_at
                    && record.is_synced()
                    && !existing.is_synced());
            if replace {
                by_key.insert(record.identity_key.clone(), record);
            }
        }
    }
}
