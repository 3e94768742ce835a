//! Document store abstractions.
//!
//! The harvester only ever talks to a `DocumentStore`: collection-scoped
//! find/insert/update/delete plus dropping whole collections. Staging and
//! canonical areas are plain `Namespace` values passed explicitly, so the
//! stage-then-merge phases never hide inside naming conventions.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

// Re-export for convenience
pub use memory::MemoryStore;

/// A database/collection pair addressing one collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Minimal filter algebra covering the queries the pipeline issues.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Match every document
    All,
    /// Field equals value
    Eq(String, Value),
    /// Field value is one of the given values
    In(String, Vec<Value>),
    /// Numeric field is strictly less than the given value
    Lt(String, i64),
    /// All sub-filters match
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    /// Evaluate this filter against a document.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => doc.get(field) == Some(value),
            Filter::In(field, values) => doc
                .get(field)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            Filter::Lt(field, bound) => doc
                .get(field)
                .and_then(Value::as_i64)
                .map(|v| v < *bound)
                .unwrap_or(false),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
        }
    }
}

/// Trait for document store backends.
///
/// Implementations must make each operation atomic per call; the pipeline
/// never requires cross-operation transactions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Find documents matching `filter`. When `projection` is given, only
    /// the listed top-level fields are returned.
    async fn find(
        &self,
        ns: &Namespace,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> Result<Vec<Value>>;

    /// Insert one document.
    async fn insert(&self, ns: &Namespace, doc: Value) -> Result<()>;

    /// Set fields on every matching document. Returns the match count.
    async fn update_many(
        &self,
        ns: &Namespace,
        filter: &Filter,
        set: &[(String, Value)],
    ) -> Result<u64>;

    /// Delete every matching document. Returns the delete count.
    async fn delete_many(&self, ns: &Namespace, filter: &Filter) -> Result<u64>;

    /// Drop a whole collection. Dropping a missing collection is a no-op.
    async fn drop_collection(&self, ns: &Namespace) -> Result<()>;
}
