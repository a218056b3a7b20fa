//! Content Extractor: turns a raw capture event into a candidate [`Record`].
//!
//! A miss (browser-internal page, card without a body) is `None`, never an
//! error; the pipeline silently skips such events. Extraction reads from the
//! handle the event carries and leaves it untouched.

use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::events::CaptureEvent;
use crate::models::{Record, RecordBody};
use crate::snapshot;

/// Cards are keyed by content, not address
const CARD_KEY_PREFIX: &str = "card:";

const MAX_DERIVED_TITLE_CHARS: usize = 80;

pub struct Extractor {
    exclude_prefixes: Vec<String>,
}

impl Extractor {
    pub fn from_config(config: &Config) -> Self {
        Self {
            exclude_prefixes: config.capture.exclude_prefixes.clone(),
        }
    }

    /// `None` when the event does not correspond to capturable content.
    pub fn extract(&self, event: &CaptureEvent) -> Option<Record> {
        match event {
            CaptureEvent::Navigation {
                url,
                title,
                occurred_at,
            } => {
                if !self.is_capturable(url) {
                    return None;
                }
                Some(Record {
                    identity_key: url.clone(),
                    title: title.clone().unwrap_or_else(|| url.clone()),
                    body: RecordBody::Page { url: url.clone() },
                    captured_at: *occurred_at,
                    remote_id: None,
                })
            }
            CaptureEvent::Card { root, occurred_at } => {
                let body = snapshot::find_part(root, "body")?;
                let markup = match snapshot::inner_markup(body) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(error = %e, "card body not serializable, skipping");
                        return None;
                    }
                };
                if markup.trim().is_empty() {
                    return None;
                }
                let styled_markup = match snapshot::styled_markup(root) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(error = %e, "card snapshot failed, skipping");
                        return None;
                    }
                };

                Some(Record {
                    identity_key: card_identity_key(&markup),
                    title: derive_title(body),
                    body: RecordBody::Snapshot {
                        markup,
                        styled_markup,
                    },
                    captured_at: *occurred_at,
                    remote_id: None,
                })
            }
        }
    }

    /// Browser-internal pages (any non-http(s) scheme) and configured
    /// prefixes are not capturable.
    fn is_capturable(&self, url: &str) -> bool {
        let lower = url.to_ascii_lowercase();
        let capturable = (lower.starts_with("http://") && url.len() > "http://".len())
            || (lower.starts_with("https://") && url.len() > "https://".len());
        if !capturable {
            return false;
        }
        !self
            .exclude_prefixes
            .iter()
            .any(|prefix| url.starts_with(prefix.as_str()))
    }
}

fn card_identity_key(markup: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(markup.as_bytes());
    format!("{}{:x}", CARD_KEY_PREFIX, hasher.finalize())
}

fn derive_title(body: &snapshot::ElementNode) -> String {
    let text = snapshot::flat_text(body);
    if text.is_empty() {
        return "(card)".to_string();
    }
    let mut title: String = text.chars().take(MAX_DERIVED_TITLE_CHARS).collect();
    if title.len() < text.len() {
        title.push('…');
    }
    title
}
