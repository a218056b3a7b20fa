//! User-triggered history operations: listing, clearing, resync.
//!
//! Unlike background capture, these surface failures visibly: a partial
//! clear exits nonzero with both outcomes spelled out.

use anyhow::Result;

use crate::config::Config;
use crate::models::Record;
use crate::pipeline::Coordinator;

/// Print the canonical view, newest first.
pub async fn run_history(config: &Config) -> Result<()> {
    let coordinator = Coordinator::from_config(config).await?;
    let view = coordinator.canonical_view().await?;

    if view.is_empty() {
        println!("No records.");
        return Ok(());
    }

    println!(
        "{:<22} {:<5} {:<9} {:<40} KEY",
        "CAPTURED", "KIND", "SYNC", "TITLE"
    );
    for record in &view {
        println!(
            "{:<22} {:<5} {:<9} {:<40} {}",
            record.captured_at.format("%Y-%m-%dT%H:%M:%SZ"),
            record.body.kind(),
            sync_state(record),
            truncate(&record.title, 40),
            record.identity_key
        );
    }
    println!("{} record(s)", view.len());

    Ok(())
}

/// Delete one committed record from both stores.
pub async fn run_delete(config: &Config, remote_id: i64) -> Result<()> {
    let coordinator = Coordinator::from_config(config).await?;
    match coordinator.delete_record(remote_id).await {
        Ok(true) => println!("deleted record {}", remote_id),
        Ok(false) => println!("deleted record {} (was not in the local cache)", remote_id),
        Err(e) => anyhow::bail!("delete failed: {}", e),
    }
    Ok(())
}

/// Clear both stores; report both outcomes and fail visibly when either
/// side did not clear.
pub async fn run_clear(config: &Config) -> Result<()> {
    let coordinator = Coordinator::from_config(config).await?;
    let report = coordinator.bulk_clear().await;

    println!("clear");
    match &report.remote {
        Ok(()) => println!("  remote: cleared"),
        Err(e) => println!("  remote: FAILED ({})", e),
    }
    match &report.local {
        Ok(()) => println!("  local:  cleared"),
        Err(e) => println!("  local:  FAILED ({})", e),
    }

    if !report.is_complete() {
        anyhow::bail!("bulk clear incomplete, the stores need reconciliation");
    }
    println!("ok");
    Ok(())
}

/// Push local-only records to the remote store.
pub async fn run_resync(config: &Config) -> Result<()> {
    let coordinator = Coordinator::from_config(config).await?;
    let report = coordinator.resync().await?;

    println!("resync");
    println!("  pushed:   {}", report.pushed);
    println!("  acquired: {}", report.acquired);
    println!("  failed:   {}", report.failed);
    if report.failed > 0 {
        anyhow::bail!("{} record(s) still local-only", report.failed);
    }
    println!("ok");
    Ok(())
}

fn sync_state(record: &Record) -> String {
    match record.remote_id {
        Some(id) => format!("#{}", id),
        None => "local".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
