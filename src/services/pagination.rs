//! Pagination engine.
//!
//! Walks a feed listing page by page, collecting identifiers of posts
//! whose timestamps fall inside a time window. Both query kinds share the
//! same state machine; only the window inclusivity differs (account feeds
//! use strict bounds, tag feeds inclusive ones).
//!
//! Failures never lose a page: the cursor is only advanced after a page
//! was processed successfully, and a failed request is retried at the same
//! cursor after a fixed wait, indefinitely unless the retry policy caps
//! attempts.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{PostIdentifier, Query, RetryPolicy};
use crate::services::platform::PlatformApi;
use crate::utils::time::unix_now;

/// Discovers post identifiers for a query within a time window.
pub struct PaginationEngine {
    client: Arc<dyn PlatformApi>,
    policy: RetryPolicy,
}

impl PaginationEngine {
    pub fn new(client: Arc<dyn PlatformApi>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Collect identifiers of posts created inside `[min_time, max_time]`.
    ///
    /// Entries are returned in discovery order with duplicates suppressed.
    /// Pagination stops when the feed reports no further pages, a page
    /// comes back empty, or the last entry of a page has aged past the
    /// window floor (feeds paginate monotonically older).
    pub async fn discover_posts(
        &self,
        query: &Query,
        min_time: i64,
        max_time: i64,
    ) -> Result<Vec<PostIdentifier>> {
        let inclusive = query.inclusive_window();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            let page = match self.client.list_page(query, cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    attempt += 1;
                    if !self.policy.allows(attempt) {
                        log::error!("Giving up on page for '{query}' after {attempt} attempts");
                        return Err(e);
                    }
                    log::error!("Page fetch failed for '{query}': {e}. Retrying same cursor.");
                    tokio::time::sleep(self.policy.wait).await;
                    continue;
                }
            };
            attempt = 0;

            if page.entries.is_empty() {
                break;
            }

            let mut last_seen = 0;
            for entry in &page.entries {
                let inside = if inclusive {
                    min_time <= entry.timestamp && entry.timestamp <= max_time
                } else {
                    min_time < entry.timestamp && entry.timestamp < max_time
                };
                if inside && seen.insert(entry.id.clone()) {
                    found.push(PostIdentifier {
                        id: entry.id.clone(),
                        shortcode: entry.shortcode.clone(),
                        discovered_at: unix_now(),
                    });
                }
                last_seen = entry.timestamp;
            }

            // Once the newest entry of the next page can only be older than
            // the floor, there is nothing left in the window.
            let floor_crossed = if inclusive {
                last_seen < min_time
            } else {
                last_seen <= min_time
            };
            if !page.has_next_page || floor_crossed {
                break;
            }
            match page.end_cursor {
                Some(next) => cursor = Some(next),
                // A next page without a cursor cannot be requested
                None => break,
            }
        }

        log::info!("Discovered {} posts for '{query}'", found.len());
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::error::AppError;
    use crate::models::Comment;
    use crate::services::platform::{FeedEntry, ListingPage};

    /// Scripted listing endpoint; records the cursor of every request.
    struct ScriptedFeed {
        pages: Mutex<Vec<Result<ListingPage>>>,
        cursors: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedFeed {
        fn new(pages: Vec<Result<ListingPage>>) -> Self {
            let mut pages = pages;
            pages.reverse();
            Self {
                pages: Mutex::new(pages),
                cursors: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PlatformApi for ScriptedFeed {
        async fn list_page(&self, _query: &Query, cursor: Option<&str>) -> Result<ListingPage> {
            self.cursors
                .lock()
                .unwrap()
                .push(cursor.map(str::to_string));
            self.pages
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(ListingPage::default()))
        }

        async fn post_by_id(&self, _id: &str) -> Result<Value> {
            unreachable!("not used by pagination")
        }

        async fn post_by_shortcode(&self, _shortcode: &str) -> Result<Value> {
            unreachable!("not used by pagination")
        }

        async fn comments(&self, _shortcode: &str, _post_id: &str) -> Result<Vec<Comment>> {
            unreachable!("not used by pagination")
        }

        async fn comments_extended(&self, _post_id: &str) -> Result<Vec<Comment>> {
            unreachable!("not used by pagination")
        }
    }

    fn entry(id: &str, ts: i64) -> FeedEntry {
        FeedEntry {
            id: id.to_string(),
            shortcode: format!("sc_{id}"),
            timestamp: ts,
        }
    }

    fn page(entries: Vec<FeedEntry>, next: Option<&str>) -> ListingPage {
        ListingPage {
            entries,
            end_cursor: next.map(str::to_string),
            has_next_page: next.is_some(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            wait: Duration::from_millis(0),
            max_attempts: None,
        }
    }

    fn engine(pages: Vec<Result<ListingPage>>) -> (PaginationEngine, Arc<ScriptedFeed>) {
        let feed = Arc::new(ScriptedFeed::new(pages));
        (
            PaginationEngine::new(feed.clone(), fast_policy()),
            feed,
        )
    }

    #[tokio::test]
    async fn test_user_window_is_strict() {
        let (engine, _) = engine(vec![Ok(page(
            vec![entry("a", 300), entry("b", 200), entry("c", 100)],
            None,
        ))]);
        let ids = engine
            .discover_posts(&Query::parse("natgeo"), 100, 300)
            .await
            .unwrap();
        // Bounds excluded for account feeds
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].id, "b");
    }

    #[tokio::test]
    async fn test_tag_window_is_inclusive() {
        let (engine, _) = engine(vec![Ok(page(
            vec![entry("a", 300), entry("b", 200), entry("c", 100)],
            None,
        ))]);
        let ids = engine
            .discover_posts(&Query::parse("#sunsets"), 100, 300)
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0].id, "a");
        assert_eq!(ids[2].id, "c");
    }

    #[tokio::test]
    async fn test_duplicates_across_pages_are_suppressed() {
        let (engine, _) = engine(vec![
            Ok(page(vec![entry("a", 250), entry("b", 240)], Some("c1"))),
            Ok(page(vec![entry("b", 240), entry("c", 230)], None)),
        ]);
        let ids = engine
            .discover_posts(&Query::parse("#tag"), 100, 300)
            .await
            .unwrap();
        let names: Vec<&str> = ids.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_stops_when_floor_crossed_despite_next_page() {
        let (engine, feed) = engine(vec![
            Ok(page(vec![entry("a", 250), entry("b", 50)], Some("c1"))),
            Ok(page(vec![entry("c", 40)], Some("c2"))),
        ]);
        let ids = engine
            .discover_posts(&Query::parse("#tag"), 100, 300)
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);
        // The second page was never requested
        assert_eq!(feed.cursors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_retries_same_cursor() {
        let (engine, feed) = engine(vec![
            Ok(page(vec![entry("a", 250)], Some("c1"))),
            Err(AppError::protocol("status not ok")),
            Ok(page(vec![entry("b", 240)], None)),
        ]);
        let ids = engine
            .discover_posts(&Query::parse("#tag"), 100, 300)
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let cursors = feed.cursors.lock().unwrap();
        // First page at no cursor, then c1 twice: the failed request did
        // not advance the cursor.
        assert_eq!(
            *cursors,
            vec![None, Some("c1".to_string()), Some("c1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_attempt_cap_surfaces_error() {
        let feed = Arc::new(ScriptedFeed::new(vec![
            Err(AppError::protocol("bad page")),
            Err(AppError::protocol("bad page")),
            Err(AppError::protocol("bad page")),
        ]));
        let engine = PaginationEngine::new(
            feed,
            RetryPolicy {
                wait: Duration::from_millis(0),
                max_attempts: Some(2),
            },
        );
        let result = engine.discover_posts(&Query::parse("#tag"), 0, 100).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_empty_page_terminates() {
        let (engine, _) = engine(vec![Ok(ListingPage {
            entries: vec![],
            end_cursor: Some("c1".to_string()),
            has_next_page: true,
        })]);
        let ids = engine
            .discover_posts(&Query::parse("#tag"), 0, 100)
            .await
            .unwrap();
        assert!(ids.is_empty());
    }
}
