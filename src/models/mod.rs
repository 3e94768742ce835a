// src/models/mod.rs

//! Domain models for the harvester.

mod config;
mod post;
mod query;

// Re-export all public types
pub use config::{
    CommentDetail, Config, CrawlerConfig, MonitorConfig, PostLookup, RetryPolicy, StorageConfig,
};
pub use post::{Comment, FetchTask, Post, PostBundle, PostIdentifier};
pub use query::{Query, QueryKind};
