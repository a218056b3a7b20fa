//! Core data models for the capture pipeline.
//!
//! A [`Record`] is the canonical unit of captured activity. It is provisional
//! (no `remote_id`) until the coordinator commits it to the remote history
//! service, and is superseded in place when a fresher capture arrives for the
//! same identity key.

use chrono::{DateTime, Utc};

/// A captured unit of browsing activity.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Unique within the canonical view. The resolved page address for
    /// navigations; `card:<sha256>` of the body markup for content cards.
    pub identity_key: String,
    pub title: String,
    pub body: RecordBody,
    pub captured_at: DateTime<Utc>,
    /// Assigned by the remote store on commit; `None` while local-only.
    pub remote_id: Option<i64>,
}

/// Payload variants: a visited page, or a self-contained content-card snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordBody {
    Page {
        url: String,
    },
    Snapshot {
        /// Inner markup of the card body, as captured.
        markup: String,
        /// Full card markup with computed styles inlined; renders without the
        /// original stylesheet context.
        styled_markup: String,
    },
}

impl RecordBody {
    pub fn kind(&self) -> &'static str {
        match self {
            RecordBody::Page { .. } => "page",
            RecordBody::Snapshot { .. } => "card",
        }
    }
}

impl Record {
    /// Whether the remote store has acknowledged this record.
    pub fn is_synced(&self) -> bool {
        self.remote_id.is_some()
    }
}
