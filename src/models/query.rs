//! Monitored query targets.

use serde::{Deserialize, Serialize};

/// Kind of feed a query paginates.
///
/// The two upstream listing endpoints apply slightly different time-window
/// rules: account feeds use strict bounds, tag feeds inclusive ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    User,
    Tag,
}

/// A monitored target: an account handle or a tag.
///
/// The query name is stable and maps 1:1 to a storage collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub kind: QueryKind,
    /// Handle or tag name, without the `#` prefix
    pub name: String,
}

impl Query {
    /// Parse a query string; a leading `#` marks a tag, anything else is
    /// treated as an account handle.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('#') {
            Some(tag) => Self {
                kind: QueryKind::Tag,
                name: tag.to_string(),
            },
            None => Self {
                kind: QueryKind::User,
                name: raw.to_string(),
            },
        }
    }

    /// Collection name this query owns in the canonical post database.
    pub fn collection(&self) -> &str {
        &self.name
    }

    /// Whether window bounds are inclusive for this query kind.
    pub fn inclusive_window(&self) -> bool {
        self.kind == QueryKind::Tag
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            QueryKind::Tag => write!(f, "#{}", self.name),
            QueryKind::User => write!(f, "{}", self.name),
        }
    }
}
