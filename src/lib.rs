//! # webtrail
//!
//! An event-driven pipeline that captures browsing activity, decides whether
//! each capture is new, and durably commits it to both a local SQLite cache
//! and an authoritative remote history service, tolerating remote outages
//! without losing or duplicating records.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────┐   ┌──────────────────┐
//! │ Event Source │──▶│ Extractor │──▶│   Coordinator    │
//! │ (JSON lines) │   │ page/card │   │ check → commit   │
//! └──────────────┘   └───────────┘   └───┬──────────┬───┘
//!                                        ▼          ▼
//!                                  ┌──────────┐ ┌──────────┐
//!                                  │  Remote  │ │  Local   │
//!                                  │ (HTTP)   │ │ (SQLite) │
//!                                  └──────────┘ └──────────┘
//! ```
//!
//! The coordinator is the only writer to either store. Remote failures are
//! absorbed into a local-only fallback; a later `trail resync` pushes the
//! backlog once the service is reachable again.
//!
//! ## Quick Start
//!
//! ```bash
//! trail init                          # create the local cache
//! trail capture https://a.example --title "A"
//! trail watch < events.jsonl          # stream of navigation/card events
//! trail history                       # canonical view of both stores
//! trail resync                        # push local-only records
//! trail clear                         # wipe both stores
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core record types |
//! | [`events`] | Capture events and the JSONL event source |
//! | [`extract`] | Content extraction (pages and card snapshots) |
//! | [`snapshot`] | Computed-style inlining for card snapshots |
//! | [`store`] | Local SQLite cache store |
//! | [`remote`] | HTTP client for the history service |
//! | [`pipeline`] | Synchronization coordinator |
//! | [`migrate`] | Schema migrations and legacy dedup |
//! | [`history`] | User-facing history/clear/resync commands |

pub mod config;
pub mod events;
pub mod extract;
pub mod history;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod remote;
pub mod snapshot;
pub mod store;
