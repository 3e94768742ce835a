//! Staging-to-canonical ingestion.
//!
//! Fetched records land in a per-run staging collection first, then move
//! into the canonical collection by natural key: an existing record with
//! the same id is deleted and the new one inserted, never patched, so the
//! canonical copy always reflects the latest fetch in full. The staging
//! collection is dropped once drained, which makes repeated ingestion of
//! the same record set idempotent and a partial run safe to redo.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::models::{PostBundle, Query, StorageConfig};
use crate::storage::{DocumentStore, Filter, Namespace};
use crate::utils::time::unix_now;

/// Writes fetched posts and comments into the canonical collections.
///
/// The only component allowed to write the canonical namespaces.
pub struct IngestEngine {
    store: Arc<dyn DocumentStore>,
    storage: StorageConfig,
    /// Age in seconds past which a post is stamped archived at write time
    staleness_secs: i64,
}

impl IngestEngine {
    pub fn new(store: Arc<dyn DocumentStore>, storage: StorageConfig, staleness_secs: i64) -> Self {
        Self {
            store,
            storage,
            staleness_secs,
        }
    }

    /// Canonical post collection for a query.
    pub fn post_namespace(&self, query: &Query) -> Namespace {
        Namespace::new(&self.storage.post_db, query.collection())
    }

    fn staging(&self, database: &str, collection: &str) -> Namespace {
        Namespace::new(
            format!("{}{}", database, self.storage.staging_suffix),
            collection,
        )
    }

    /// Ingest a fetched record set for a query. Idempotent.
    pub async fn ingest(&self, query: &Query, bundles: &[PostBundle]) -> Result<()> {
        if bundles.is_empty() {
            return Ok(());
        }
        log::info!("Saving {} posts for '{query}'", bundles.len());

        let cutoff = unix_now() - self.staleness_secs;
        let post_staging = self.staging(&self.storage.post_db, query.collection());
        for bundle in bundles {
            let mut doc = bundle.post.to_document();
            let obj = doc
                .as_object_mut()
                .ok_or_else(|| AppError::store("post did not serialize to an object"))?;
            // Write-time flags; never recomputed on read
            obj.insert("archived".into(), json!(bundle.post.created_at < cutoff));
            obj.insert("not_found".into(), json!(false));
            self.store.insert(&post_staging, doc).await?;
        }
        self.merge(&post_staging, &self.post_namespace(query)).await?;

        for bundle in bundles {
            if bundle.comments.is_empty() {
                continue;
            }
            let comment_staging = self.staging(&self.storage.comment_db, &bundle.post.id);
            for comment in &bundle.comments {
                self.store
                    .insert(&comment_staging, comment.to_document())
                    .await?;
            }
            let canonical = Namespace::new(&self.storage.comment_db, &bundle.post.id);
            self.merge(&comment_staging, &canonical).await?;
        }

        log::info!("Saving completed for '{query}'");
        Ok(())
    }

    /// Move every staged document into the canonical collection, replacing
    /// by natural key `id`, then drop the staging collection.
    async fn merge(&self, staging: &Namespace, canonical: &Namespace) -> Result<()> {
        let staged = self.store.find(staging, &Filter::All, None).await?;
        for doc in staged {
            let id = doc
                .get("id")
                .cloned()
                .ok_or_else(|| AppError::store(format!("staged document in {staging} has no id")))?;
            self.store
                .delete_many(canonical, &Filter::Eq("id".into(), id))
                .await?;
            self.store.insert(canonical, doc).await?;
        }
        self.store.drop_collection(staging).await
    }

    /// Bulk-mark canonical posts as deleted upstream. Only the two flags
    /// change; every other field keeps its last fetched value.
    pub async fn mark_not_found(&self, query: &Query, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        log::info!("Posts not found for '{query}': {}", ids.len());
        let values: Vec<Value> = ids.iter().map(|id| json!(id)).collect();
        self.store
            .update_many(
                &self.post_namespace(query),
                &Filter::In("id".into(), values),
                &[
                    ("archived".into(), json!(true)),
                    ("not_found".into(), json!(true)),
                ],
            )
            .await
    }
}
