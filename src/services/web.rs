//! Web platform client.
//!
//! Implements `PlatformApi` against the platform's public web and GraphQL
//! endpoints. Account feeds need a numeric user id, resolved lazily from
//! the profile endpoint and cached per handle. Non-success HTTP statuses
//! are surfaced as coded API errors so the pool can classify them;
//! unexpected page shapes become protocol errors.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::Mutex;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Comment, CrawlerConfig, Query, QueryKind};
use crate::services::normalize;
use crate::services::platform::{FeedEntry, ListingPage, PlatformApi};

const BASE_URL: &str = "https://www.instagram.com";
const SESSION_BASE_URL: &str = "https://i.instagram.com";

// GraphQL query ids for the feed and comment endpoints
const USER_FEED_QUERY: &str = "17880160963012870";
const TAG_FEED_QUERY: &str = "17882293912014529";
const COMMENTS_QUERY: &str = "17852405266163336";

const FEED_PAGE_SIZE: u32 = 500;
const COMMENT_PAGE_SIZE: u32 = 1000;

/// `PlatformApi` implementation over the public web endpoints.
pub struct WebClient {
    client: Client,
    base_url: String,
    session_base_url: String,
    /// handle -> numeric user id
    user_ids: Mutex<HashMap<String, String>>,
}

impl WebClient {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            session_base_url: SESSION_BASE_URL.to_string(),
            user_ids: Mutex::new(HashMap::new()),
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let url = Url::parse(url)?;
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::api(status.as_u16(), format!("GET {url}")));
        }
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Resolve and cache the numeric user id behind an account handle.
    async fn user_id(&self, handle: &str) -> Result<String> {
        {
            let cache = self.user_ids.lock().await;
            if let Some(id) = cache.get(handle) {
                return Ok(id.clone());
            }
        }
        let url = format!("{}/{}/?__a=1", self.base_url, handle);
        let profile = self.get_json(&url).await?;
        let id = profile
            .get("user")
            .and_then(|u| u.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::protocol(format!("profile for '{handle}' has no user id")))?
            .to_string();
        self.user_ids
            .lock()
            .await
            .insert(handle.to_string(), id.clone());
        Ok(id)
    }

    fn feed_url(
        &self,
        query_id: &str,
        param: &str,
        value: &str,
        cursor: Option<&str>,
    ) -> Result<String> {
        let mut url = Url::parse(&format!("{}/graphql/query/", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("query_id", query_id)
            .append_pair(param, value)
            .append_pair("first", &FEED_PAGE_SIZE.to_string());
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair("after", cursor);
        }
        Ok(url.into())
    }

    fn comments_url(&self, shortcode: &str, cursor: Option<&str>) -> Result<String> {
        let mut url = Url::parse(&format!("{}/graphql/query/", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("query_id", COMMENTS_QUERY)
            .append_pair("shortcode", shortcode)
            .append_pair("first", &COMMENT_PAGE_SIZE.to_string());
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair("after", cursor);
        }
        Ok(url.into())
    }
}

/// Cursor for the next comments request. A next page without a cursor
/// cannot be requested and ends pagination.
fn advance_cursor(end_cursor: Option<String>, has_next_page: bool) -> Option<String> {
    if has_next_page {
        end_cursor
    } else {
        None
    }
}

/// Extract a listing page from a feed response body.
///
/// Both feeds nest the same connection shape under different paths:
/// `data.user.edge_owner_to_timeline_media` for accounts and
/// `data.hashtag.edge_hashtag_to_media` for tags.
fn parse_listing(kind: QueryKind, body: &Value) -> Result<ListingPage> {
    if body.get("status").and_then(Value::as_str) != Some("ok") {
        return Err(AppError::protocol("feed query returned non-ok status"));
    }

    let media = match kind {
        QueryKind::User => body
            .get("data")
            .and_then(|v| v.get("user"))
            .and_then(|v| v.get("edge_owner_to_timeline_media")),
        QueryKind::Tag => body
            .get("data")
            .and_then(|v| v.get("hashtag"))
            .and_then(|v| v.get("edge_hashtag_to_media")),
    }
    .ok_or_else(|| AppError::protocol("feed query response missing media connection"))?;

    let page_info = media
        .get("page_info")
        .ok_or_else(|| AppError::protocol("feed page missing page_info"))?;
    let has_next_page = page_info
        .get("has_next_page")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let end_cursor = page_info
        .get("end_cursor")
        .and_then(Value::as_str)
        .map(str::to_string);

    let edges = media
        .get("edges")
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::protocol("feed page missing edges"))?;

    let mut entries = Vec::with_capacity(edges.len());
    for edge in edges {
        let node = edge
            .get("node")
            .ok_or_else(|| AppError::protocol("feed edge missing node"))?;
        entries.push(FeedEntry {
            id: node
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::protocol("feed node missing id"))?
                .to_string(),
            shortcode: node
                .get("shortcode")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            timestamp: node
                .get("taken_at_timestamp")
                .and_then(Value::as_i64)
                .ok_or_else(|| AppError::protocol("feed node missing timestamp"))?,
        });
    }

    Ok(ListingPage {
        entries,
        end_cursor,
        has_next_page,
    })
}

/// Pull the comment nodes out of one comments page, flattening threaded
/// replies when `extended` detail is requested.
fn parse_comments_page(body: &Value, extended: bool) -> Result<(Vec<Value>, Option<String>, bool)> {
    if body.get("status").and_then(Value::as_str) != Some("ok") {
        return Err(AppError::protocol("comments query returned non-ok status"));
    }
    let connection = body
        .get("data")
        .and_then(|v| v.get("shortcode_media"))
        .and_then(|v| v.get("edge_media_to_comment"))
        .ok_or_else(|| AppError::protocol("comments response missing connection"))?;

    let page_info = connection
        .get("page_info")
        .ok_or_else(|| AppError::protocol("comments page missing page_info"))?;
    let has_next_page = page_info
        .get("has_next_page")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let end_cursor = page_info
        .get("end_cursor")
        .and_then(Value::as_str)
        .map(str::to_string);

    let edges = connection
        .get("edges")
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::protocol("comments page missing edges"))?;

    let mut nodes = Vec::new();
    for edge in edges {
        let node = edge
            .get("node")
            .cloned()
            .ok_or_else(|| AppError::protocol("comment edge missing node"))?;
        if extended {
            if let Some(replies) = node
                .get("edge_threaded_comments")
                .and_then(|v| v.get("edges"))
                .and_then(Value::as_array)
            {
                for reply in replies {
                    if let Some(reply_node) = reply.get("node") {
                        nodes.push(reply_node.clone());
                    }
                }
            }
        }
        nodes.push(node);
    }
    Ok((nodes, end_cursor, has_next_page))
}

#[async_trait]
impl PlatformApi for WebClient {
    async fn list_page(&self, query: &Query, cursor: Option<&str>) -> Result<ListingPage> {
        let url = match query.kind {
            QueryKind::User => {
                let user_id = self.user_id(&query.name).await?;
                self.feed_url(USER_FEED_QUERY, "id", &user_id, cursor)?
            }
            QueryKind::Tag => self.feed_url(TAG_FEED_QUERY, "tag_name", &query.name, cursor)?,
        };
        let body = self.get_json(&url).await?;
        parse_listing(query.kind, &body)
    }

    async fn post_by_id(&self, id: &str) -> Result<Value> {
        let url = format!("{}/api/v1/media/{}/info/", self.session_base_url, id);
        let body = self.get_json(&url).await?;
        body.get("items")
            .and_then(|v| v.get(0))
            .cloned()
            .ok_or_else(|| AppError::protocol(format!("media info for '{id}' has no items")))
    }

    async fn post_by_shortcode(&self, shortcode: &str) -> Result<Value> {
        let url = format!("{}/p/{}/?__a=1", self.base_url, shortcode);
        let body = self.get_json(&url).await?;
        body.get("graphql")
            .and_then(|v| v.get("shortcode_media"))
            .cloned()
            .ok_or_else(|| {
                AppError::protocol(format!("post '{shortcode}' response missing media"))
            })
    }

    async fn comments(&self, shortcode: &str, post_id: &str) -> Result<Vec<Comment>> {
        self.fetch_comment_pages(shortcode, post_id, false).await
    }

    async fn comments_extended(&self, post_id: &str) -> Result<Vec<Comment>> {
        // The comments endpoint is keyed by shortcode; the id path goes
        // through the media info endpoint first.
        let post = self.post_by_id(post_id).await?;
        let shortcode = post
            .get("code")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::protocol(format!("media '{post_id}' has no shortcode")))?
            .to_string();
        self.fetch_comment_pages(&shortcode, post_id, true).await
    }
}

impl WebClient {
    async fn fetch_comment_pages(
        &self,
        shortcode: &str,
        post_id: &str,
        extended: bool,
    ) -> Result<Vec<Comment>> {
        let mut cursor: Option<String> = None;
        let mut all = Vec::new();
        loop {
            let url = self.comments_url(shortcode, cursor.as_deref())?;
            let body = self.get_json(&url).await?;
            let (mut nodes, end_cursor, has_next_page) = parse_comments_page(&body, extended)?;
            // Pages arrive newest-first; prepend to keep chronological order
            nodes.extend(std::mem::take(&mut all));
            all = nodes;
            match advance_cursor(end_cursor, has_next_page) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        // Both comment paths of this client return web-shaped nodes
        all.iter()
            .map(|raw| normalize::comment_from_web(raw, post_id))
            .collect()
    }
}
