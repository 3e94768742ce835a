//! Post and comment data structures.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Minimal handle on a post produced by discovery or refresh selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostIdentifier {
    /// Natural key of the post upstream
    pub id: String,
    /// Public shortcode used by the web endpoints
    pub shortcode: String,
    /// Unix time when the identifier entered the pipeline
    pub discovered_at: i64,
}

/// A harvested post in canonical shape.
///
/// `archived` and `not_found` are write-time flags owned by the ingestion
/// engine; they are never recomputed on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub shortcode: String,
    /// Unix creation time upstream
    pub created_at: i64,
    /// Author handle
    pub author: String,
    /// Caption text, empty if the post has none
    pub caption: String,
    pub like_count: i64,
    pub comment_count: i64,
    /// Too old to be proactively re-fetched; stamped at merge time
    #[serde(default)]
    pub archived: bool,
    /// Confirmed deleted or inaccessible upstream
    #[serde(default)]
    pub not_found: bool,
    /// Raw upstream payload, kept for fields the canonical shape drops
    #[serde(default)]
    pub raw: Value,
}

impl Post {
    /// Serialize into a store document.
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A comment owned by exactly one post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author: String,
    pub text: String,
    /// Unix creation time upstream
    pub created_at: i64,
    #[serde(default)]
    pub raw: Value,
}

impl Comment {
    /// Serialize into a store document.
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A fetched post together with its comment set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostBundle {
    pub post: Post,
    pub comments: Vec<Comment>,
}

/// A unit of work inside the fetch pool. Transient, never persisted.
#[derive(Debug, Clone)]
pub struct FetchTask {
    /// Position in the original identifier list, for log correlation
    pub sequence: usize,
    pub identifier: PostIdentifier,
    /// Completed tries so far
    pub attempt: u32,
}

impl FetchTask {
    pub fn new(sequence: usize, identifier: PostIdentifier) -> Self {
        Self {
            sequence,
            identifier,
            attempt: 0,
        }
    }

    /// The same task, one attempt later.
    pub fn requeued(mut self) -> Self {
        self.attempt += 1;
        self
    }
}
