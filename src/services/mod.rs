//! Service layer for the harvester.
//!
//! - Discovery of post identifiers (`PaginationEngine`)
//! - Concurrent download of posts and comments (`FetchPool`)
//! - Selection of stale records for re-fetch (`RefreshSelector`)
//! - The upstream capability seam (`PlatformApi`) and its web binding

pub mod fetch;
pub mod normalize;
pub mod pagination;
pub mod platform;
pub mod refresh;
pub mod web;

pub use fetch::{FetchOutcome, FetchPool};
pub use pagination::PaginationEngine;
pub use platform::{FeedEntry, ListingPage, PlatformApi};
pub use refresh::{RefreshSelector, StaleRecord};
pub use web::WebClient;
