//! Upstream platform capability traits.
//!
//! The pipeline never calls the platform directly; it goes through
//! `PlatformApi`, which surfaces raw post payloads, normalized comments,
//! and classified errors. Concrete bindings (the web client here, or a
//! session-backed client elsewhere) implement this trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::{Comment, Query};

/// One entry of a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: String,
    pub shortcode: String,
    /// Unix creation time upstream
    pub timestamp: i64,
}

/// One page of a feed listing.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    /// Entries in feed order, newest first
    pub entries: Vec<FeedEntry>,
    /// Cursor for the next page, if any
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

/// Remote platform surface consumed by the pipeline.
///
/// Fetch errors must carry the upstream status code as
/// `AppError::Api { code, .. }` so the pool can classify them; transport
/// failures surface as `Http`/`Json`, malformed listing pages as
/// `Protocol`.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Fetch one listing page for a query, starting at `cursor`
    /// (None for the first page).
    async fn list_page(&self, query: &Query, cursor: Option<&str>) -> Result<ListingPage>;

    /// Fetch a post body by its internal id. Richer payload; typically
    /// needs a session.
    async fn post_by_id(&self, id: &str) -> Result<Value>;

    /// Fetch a post body by its public shortcode.
    async fn post_by_shortcode(&self, shortcode: &str) -> Result<Value>;

    /// Fetch the top-level comments of a post, already normalized and
    /// keyed by `post_id`. Each implementation pairs its own payload
    /// shape with the matching normalizer.
    async fn comments(&self, shortcode: &str, post_id: &str) -> Result<Vec<Comment>>;

    /// Fetch the full comment set of a post, including threaded replies.
    /// Slower than `comments`.
    async fn comments_extended(&self, post_id: &str) -> Result<Vec<Comment>>;
}
