//! Normalization of raw upstream payloads.
//!
//! The two post endpoints return different field layouts for the same
//! data; both are mapped to the canonical `Post` shape here. Comments are
//! normalized by the `PlatformApi` implementation that fetched them, so
//! each client pairs its payload shape with the matching mapping (the web
//! client uses `comment_from_web`). The rest of the pipeline never depends
//! on upstream field names. Missing or mistyped fields surface as protocol
//! errors, which the pool treats as transport-class failures (schema drift
//! is retried, not ingested).

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Comment, Post};

fn require_str(raw: &Value, field: &str) -> Result<String> {
    raw.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::protocol(format!("payload missing string field '{field}'")))
}

fn require_i64(raw: &Value, field: &str) -> Result<i64> {
    raw.get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::protocol(format!("payload missing numeric field '{field}'")))
}

fn nested_count(raw: &Value, field: &str) -> i64 {
    raw.get(field)
        .and_then(|v| v.get("count"))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

/// Normalize a post from the web payload (shortcode endpoint).
pub fn post_from_web(raw: &Value) -> Result<Post> {
    let caption = raw
        .get("edge_media_to_caption")
        .and_then(|v| v.get("edges"))
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("node"))
        .and_then(|v| v.get("text"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let author = raw
        .get("owner")
        .map(|owner| require_str(owner, "username"))
        .transpose()?
        .unwrap_or_default();

    Ok(Post {
        id: require_str(raw, "id")?,
        shortcode: require_str(raw, "shortcode")?,
        created_at: require_i64(raw, "taken_at_timestamp")?,
        author,
        caption,
        like_count: nested_count(raw, "edge_media_preview_like"),
        comment_count: nested_count(raw, "edge_media_to_comment"),
        archived: false,
        not_found: false,
        raw: raw.clone(),
    })
}

/// Normalize a post from the session payload (id endpoint).
///
/// The id endpoint returns a composite `id` of the form `mediaid_userid`;
/// only the leading media id is the natural key.
pub fn post_from_session(raw: &Value) -> Result<Post> {
    let id = require_str(raw, "id")?;
    let id = id.split('_').next().unwrap_or(&id).to_string();

    let shortcode = match raw.get("code").and_then(Value::as_str) {
        Some(code) => code.to_string(),
        // Fall back to the permalink, .../p/<shortcode>/
        None => require_str(raw, "link")?
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("")
            .to_string(),
    };

    let caption = raw
        .get("caption")
        .and_then(|v| v.get("text"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let author = raw
        .get("user")
        .map(|user| require_str(user, "username"))
        .transpose()?
        .unwrap_or_default();

    Ok(Post {
        id,
        shortcode,
        created_at: require_i64(raw, "created_time")?,
        author,
        caption,
        like_count: nested_count(raw, "likes"),
        comment_count: nested_count(raw, "comments"),
        archived: false,
        not_found: false,
        raw: raw.clone(),
    })
}

/// Normalize one comment from the web payload.
pub fn comment_from_web(raw: &Value, post_id: &str) -> Result<Comment> {
    let author = raw
        .get("owner")
        .map(|owner| require_str(owner, "username"))
        .transpose()?
        .unwrap_or_default();

    Ok(Comment {
        id: require_str(raw, "id")?,
        post_id: post_id.to_string(),
        author,
        text: require_str(raw, "text")?,
        created_at: require_i64(raw, "created_at")?,
        raw: raw.clone(),
    })
}
