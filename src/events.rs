//! Event source: capture events entering the pipeline.
//!
//! Events arrive as JSON lines, one per tracked navigation completion or
//! explicit card capture, and each event carries the content handle the
//! extractor reads at processing time. `run_watch` drives the stream:
//! one cooperative task per event on a shared coordinator, so overlapping
//! events interleave at their I/O suspension points while same-key events
//! are serialized inside the coordinator.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::pipeline::{CaptureOutcome, Coordinator};
use crate::snapshot::ElementNode;

/// One observed unit of browsing activity.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaptureEvent {
    /// A tracked navigation completed.
    Navigation {
        url: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default = "Utc::now")]
        occurred_at: DateTime<Utc>,
    },
    /// The user signalled "capture" on a highlighted content card.
    Card {
        root: ElementNode,
        #[serde(default = "Utc::now")]
        occurred_at: DateTime<Utc>,
    },
}

/// Read capture events from stdin (JSON lines) until EOF, feeding each one
/// to the coordinator as its own task.
pub async fn run_watch(config: &Config) -> Result<()> {
    let coordinator = Arc::new(Coordinator::from_config(config).await?);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut tasks: JoinSet<Tally> = JoinSet::new();
    let mut malformed = 0u64;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let event: CaptureEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                // A bad producer line never aborts the stream
                tracing::warn!(error = %e, "skipping malformed event line");
                malformed += 1;
                continue;
            }
        };

        let coordinator = Arc::clone(&coordinator);
        tasks.spawn(async move {
            match coordinator.handle_event(&event).await {
                Ok(CaptureOutcome::Committed(record)) => {
                    tracing::debug!(key = %record.identity_key, "committed");
                    Tally::Committed
                }
                Ok(CaptureOutcome::LocalOnly(record)) => {
                    tracing::debug!(key = %record.identity_key, "cached locally");
                    Tally::LocalOnly
                }
                Ok(CaptureOutcome::Duplicate) => Tally::Duplicate,
                Ok(CaptureOutcome::Skipped) => Tally::Skipped,
                Err(e) => {
                    // Best-effort background capture: surfaced in logs only
                    tracing::error!(error = %e, "capture event failed");
                    Tally::Failed
                }
            }
        });
    }

    let mut committed = 0u64;
    let mut local_only = 0u64;
    let mut duplicates = 0u64;
    let mut skipped = 0u64;
    let mut failed = 0u64;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Tally::Committed) => committed += 1,
            Ok(Tally::LocalOnly) => local_only += 1,
            Ok(Tally::Duplicate) => duplicates += 1,
            Ok(Tally::Skipped) => skipped += 1,
            Ok(Tally::Failed) | Err(_) => failed += 1,
        }
    }

    println!("watch");
    println!("  committed:  {}", committed);
    println!("  local-only: {}", local_only);
    println!("  duplicates: {}", duplicates);
    println!("  skipped:    {}", skipped + malformed);
    if failed > 0 {
        println!("  failed:     {}", failed);
    }
    println!("ok");

    Ok(())
}

enum Tally {
    Committed,
    LocalOnly,
    Duplicate,
    Skipped,
    Failed,
}

/// One-shot producer for a navigation event.
pub async fn run_capture(config: &Config, url: String, title: Option<String>) -> Result<()> {
    let coordinator = Coordinator::from_config(config).await?;
    let event = CaptureEvent::Navigation {
        url,
        title,
        occurred_at: Utc::now(),
    };
    report_outcome(coordinator.handle_event(&event).await?);
    Ok(())
}

/// One-shot producer for a card capture: reads an element tree (JSON) from a
/// file and runs it through the pipeline.
pub async fn run_collect(config: &Config, path: &std::path::Path) -> Result<()> {
    use anyhow::Context;

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read card tree: {}", path.display()))?;
    let root: ElementNode =
        serde_json::from_str(&content).with_context(|| "Failed to parse card tree")?;

    let coordinator = Coordinator::from_config(config).await?;
    let event = CaptureEvent::Card {
        root,
        occurred_at: Utc::now(),
    };
    report_outcome(coordinator.handle_event(&event).await?);
    Ok(())
}

fn report_outcome(outcome: CaptureOutcome) {
    match outcome {
        CaptureOutcome::Committed(record) => {
            println!(
                "committed {} (remote id {})",
                record.identity_key,
                record.remote_id.unwrap_or_default()
            );
        }
        CaptureOutcome::LocalOnly(record) => {
            println!("cached locally {} (remote unavailable)", record.identity_key);
        }
        CaptureOutcome::Duplicate => println!("duplicate, nothing to do"),
        CaptureOutcome::Skipped => println!("not capturable, skipped"),
    }
}
