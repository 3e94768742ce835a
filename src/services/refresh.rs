//! Refresh selection.
//!
//! Decides which canonical records are due for a re-fetch: not archived
//! and older than the staleness window. Read-only; the fetch pool and the
//! ingestion engine do the actual work.

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::models::PostIdentifier;
use crate::storage::{DocumentStore, Filter, Namespace};
use crate::utils::time::unix_now;

/// Minimal identifying fields of a stale canonical record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleRecord {
    pub id: String,
    pub shortcode: String,
    pub created_at: i64,
}

impl StaleRecord {
    /// Hand off to the fetch pool.
    pub fn into_identifier(self) -> PostIdentifier {
        PostIdentifier {
            id: self.id,
            shortcode: self.shortcode,
            discovered_at: unix_now(),
        }
    }
}

/// Selects canonical records eligible for re-fetch.
pub struct RefreshSelector {
    store: Arc<dyn DocumentStore>,
}

impl RefreshSelector {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Records in `ns` with `archived == false` and `created_at` strictly
    /// older than `now - staleness_secs`.
    pub async fn select_stale(
        &self,
        ns: &Namespace,
        staleness_secs: i64,
    ) -> Result<Vec<StaleRecord>> {
        let cutoff = unix_now() - staleness_secs;
        let filter = Filter::And(vec![
            Filter::eq("archived", false),
            Filter::Lt("created_at".into(), cutoff),
        ]);
        let docs = self
            .store
            .find(ns, &filter, Some(&["id", "shortcode", "created_at"]))
            .await?;

        let records: Vec<StaleRecord> = docs.iter().filter_map(Self::record_from_doc).collect();
        log::info!("Posts to update in {ns}: {}", records.len());
        Ok(records)
    }

    fn record_from_doc(doc: &Value) -> Option<StaleRecord> {
        Some(StaleRecord {
            id: doc.get("id")?.as_str()?.to_string(),
            shortcode: doc
                .get("shortcode")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            created_at: doc.get("created_at")?.as_i64()?,
        })
    }
}
