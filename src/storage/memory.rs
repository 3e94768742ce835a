//! In-process document store.
//!
//! Default backend for tests and dry runs. A server-backed document store
//! binding implements the same trait outside this crate.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::storage::{DocumentStore, Filter, Namespace};

type Collection = Vec<Value>;
type Database = HashMap<String, Collection>;

/// Document store holding everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    databases: Mutex<HashMap<String, Database>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn project(doc: &Value, projection: Option<&[&str]>) -> Value {
        match projection {
            None => doc.clone(),
            Some(fields) => {
                let mut out = serde_json::Map::new();
                if let Some(obj) = doc.as_object() {
                    for field in fields {
                        if let Some(value) = obj.get(*field) {
                            out.insert((*field).to_string(), value.clone());
                        }
                    }
                }
                Value::Object(out)
            }
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Database>>> {
        self.databases
            .lock()
            .map_err(|_| AppError::store("memory store lock poisoned"))
    }

    /// Collection names present in a database. Test and maintenance helper.
    pub fn collections(&self, database: &str) -> Result<Vec<String>> {
        let dbs = self.lock()?;
        Ok(dbs
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        ns: &Namespace,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> Result<Vec<Value>> {
        let dbs = self.lock()?;
        let docs = dbs
            .get(&ns.database)
            .and_then(|db| db.get(&ns.collection))
            .map(|coll| {
                coll.iter()
                    .filter(|doc| filter.matches(doc))
                    .map(|doc| Self::project(doc, projection))
                    .collect()
            })
            .unwrap_or_default();
        Ok(docs)
    }

    async fn insert(&self, ns: &Namespace, doc: Value) -> Result<()> {
        let mut dbs = self.lock()?;
        dbs.entry(ns.database.clone())
            .or_default()
            .entry(ns.collection.clone())
            .or_default()
            .push(doc);
        Ok(())
    }

    async fn update_many(
        &self,
        ns: &Namespace,
        filter: &Filter,
        set: &[(String, Value)],
    ) -> Result<u64> {
        let mut dbs = self.lock()?;
        let mut updated = 0;
        if let Some(coll) = dbs
            .get_mut(&ns.database)
            .and_then(|db| db.get_mut(&ns.collection))
        {
            for doc in coll.iter_mut().filter(|doc| filter.matches(doc)) {
                if let Some(obj) = doc.as_object_mut() {
                    for (field, value) in set {
                        obj.insert(field.clone(), value.clone());
                    }
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_many(&self, ns: &Namespace, filter: &Filter) -> Result<u64> {
        let mut dbs = self.lock()?;
        let mut deleted = 0;
        if let Some(coll) = dbs
            .get_mut(&ns.database)
            .and_then(|db| db.get_mut(&ns.collection))
        {
            let before = coll.len();
            coll.retain(|doc| !filter.matches(doc));
            deleted = (before - coll.len()) as u64;
        }
        Ok(deleted)
    }

    async fn drop_collection(&self, ns: &Namespace) -> Result<()> {
        let mut dbs = self.lock()?;
        if let Some(db) = dbs.get_mut(&ns.database) {
            db.remove(&ns.collection);
        }
        Ok(())
    }
}
