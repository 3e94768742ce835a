//! Monitor operations.
//!
//! The outward surface of the harvester: discover-and-ingest new posts for
//! a query, refresh stale stored posts, and re-download a whole query from
//! another database. All operations are idempotent and safe to repeat;
//! the enclosing scheduler simply reruns a cycle after a failure.

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::models::{Config, PostIdentifier, Query};
use crate::pipeline::ingest::IngestEngine;
use crate::services::fetch::FetchPool;
use crate::services::pagination::PaginationEngine;
use crate::services::platform::PlatformApi;
use crate::services::refresh::RefreshSelector;
use crate::storage::{DocumentStore, Filter, Namespace};
use crate::utils::time::{days_to_secs, unix_now};

/// Batch size for full re-downloads.
const MIGRATE_CHUNK: usize = 500;

/// Ties discovery, fetching, and ingestion together for one platform
/// client and one document store.
pub struct Monitor {
    client: Arc<dyn PlatformApi>,
    store: Arc<dyn DocumentStore>,
    config: Config,
}

impl Monitor {
    pub fn new(client: Arc<dyn PlatformApi>, store: Arc<dyn DocumentStore>, config: Config) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    fn staleness_secs(&self) -> i64 {
        days_to_secs(self.config.monitor.update_days as i64)
    }

    fn ingest_engine(&self) -> IngestEngine {
        IngestEngine::new(
            self.store.clone(),
            self.config.storage.clone(),
            self.staleness_secs(),
        )
    }

    fn fetch_pool(&self) -> FetchPool {
        FetchPool::from_config(self.client.clone(), &self.config.crawler)
    }

    /// Harvest new posts for a query.
    ///
    /// The window starts at the newest stored `created_at`; a collection
    /// with no history defaults to the last day.
    pub async fn search_query(&self, query: &Query) -> Result<()> {
        log::info!("Searching '{query}' new posts");

        let engine = self.ingest_engine();
        let now = unix_now();
        let min_time = match self.newest_created_at(&engine.post_namespace(query)).await? {
            Some(ts) => ts,
            None => now - days_to_secs(1),
        };

        let pagination =
            PaginationEngine::new(self.client.clone(), self.config.crawler.page_retry_policy());
        let identifiers = pagination.discover_posts(query, min_time, now).await?;

        let outcome = self.fetch_pool().fetch_all(identifiers).await;
        if !outcome.not_found.is_empty() {
            // Freshly discovered posts that vanished before the fetch;
            // nothing stored yet, so there is nothing to mark
            log::warn!(
                "'{query}': {} posts disappeared between discovery and fetch",
                outcome.not_found.len()
            );
        }
        engine.ingest(query, &outcome.bundles).await
    }

    /// Re-fetch stored posts older than `older_days` (the configured
    /// staleness window when None) that are not archived yet. Posts that
    /// vanished upstream are marked archived and not-found.
    pub async fn update_query(&self, query: &Query, older_days: Option<u64>) -> Result<()> {
        let staleness = older_days
            .map(|days| days_to_secs(days as i64))
            .unwrap_or_else(|| self.staleness_secs());
        log::info!("Updating '{query}'");

        let engine = self.ingest_engine();
        let selector = RefreshSelector::new(self.store.clone());
        let records = selector
            .select_stale(&engine.post_namespace(query), staleness)
            .await?;
        if records.is_empty() {
            log::info!("Updated '{query}': nothing stale");
            return Ok(());
        }

        let identifiers: Vec<PostIdentifier> =
            records.into_iter().map(|r| r.into_identifier()).collect();
        let outcome = self.fetch_pool().fetch_all(identifiers).await;

        let missing: Vec<String> = outcome.not_found.iter().map(|i| i.id.clone()).collect();
        engine.mark_not_found(query, &missing).await?;
        engine.ingest(query, &outcome.bundles).await?;

        log::info!("Updated '{query}'");
        Ok(())
    }

    /// Re-download every post of a query whose id is stored in another
    /// database, in chunks, ingesting each chunk into the canonical
    /// collections.
    pub async fn migrate_query(&self, query: &Query, from_db: &str) -> Result<()> {
        log::info!("Migrating posts of '{query}' from '{from_db}'");

        let source = Namespace::new(from_db, query.collection());
        let docs = self
            .store
            .find(&source, &Filter::All, Some(&["id", "shortcode"]))
            .await?;
        let now = unix_now();
        let identifiers: Vec<PostIdentifier> = docs
            .iter()
            .filter_map(|doc| {
                Some(PostIdentifier {
                    id: doc.get("id")?.as_str()?.to_string(),
                    shortcode: doc
                        .get("shortcode")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    discovered_at: now,
                })
            })
            .collect();

        let engine = self.ingest_engine();
        let pool = self.fetch_pool();
        for chunk in identifiers.chunks(MIGRATE_CHUNK) {
            let outcome = pool.fetch_all(chunk.to_vec()).await;
            engine.ingest(query, &outcome.bundles).await?;
        }
        Ok(())
    }

    async fn newest_created_at(&self, ns: &Namespace) -> Result<Option<i64>> {
        let docs = self
            .store
            .find(ns, &Filter::All, Some(&["created_at"]))
            .await?;
        Ok(docs
            .iter()
            .filter_map(|doc| doc.get("created_at").and_then(Value::as_i64))
            .max())
    }
}
