//! Fetch worker pool.
//!
//! A fixed number of workers drain one shared task queue, fetching post
//! bodies and comment sets. Failure handling is class-based:
//!
//! - rate-limit signals (codes 0/429) requeue the task and pause the whole
//!   pool, since the throttle is on the shared client, not the task;
//! - not-found signals (400/404) drop the task for good and report the
//!   identifier so the stored record can be marked deleted;
//! - transport failures requeue with a short worker-local pause;
//! - any other client error requeues with no pause.
//!
//! The pool drains when the queue is empty and nothing is in flight. A
//! pool-wide pause blocks new task starts but never interrupts an
//! in-flight request.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};

use crate::error::{FailureClass, Result};
use crate::models::{
    CommentDetail, CrawlerConfig, FetchTask, PostBundle, PostIdentifier, PostLookup, RetryPolicy,
};
use crate::services::normalize;
use crate::services::platform::PlatformApi;

/// Everything a fetch pass produced.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Successfully fetched posts with their comments, in completion order
    pub bundles: Vec<PostBundle>,
    /// Identifiers whose fetch failed with a not-found-class error
    pub not_found: Vec<PostIdentifier>,
    /// Tasks abandoned after exhausting the attempt cap
    pub dropped: usize,
}

/// Bounded-concurrency downloader for post bodies and comments.
pub struct FetchPool {
    client: Arc<dyn PlatformApi>,
    concurrency: usize,
    rate_limit_wait: Duration,
    transport_wait: Duration,
    retry: RetryPolicy,
    post_lookup: PostLookup,
    comment_detail: CommentDetail,
}

/// Queue state shared by all workers.
struct PoolState {
    queue: VecDeque<FetchTask>,
    in_flight: usize,
    /// When set, no worker may start a task before this instant
    resume_at: Option<Instant>,
}

impl FetchPool {
    pub fn new(
        client: Arc<dyn PlatformApi>,
        concurrency: usize,
        rate_limit_wait: Duration,
        transport_wait: Duration,
        retry: RetryPolicy,
        post_lookup: PostLookup,
        comment_detail: CommentDetail,
    ) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            rate_limit_wait,
            transport_wait,
            retry,
            post_lookup,
            comment_detail,
        }
    }

    pub fn from_config(client: Arc<dyn PlatformApi>, config: &CrawlerConfig) -> Self {
        Self::new(
            client,
            config.max_concurrent,
            Duration::from_secs(config.rate_limit_wait_secs),
            Duration::from_secs(config.transport_wait_secs),
            RetryPolicy {
                wait: Duration::from_secs(config.transport_wait_secs),
                max_attempts: config.max_attempts,
            },
            config.post_lookup,
            config.comment_detail,
        )
    }

    /// Fetch every identifier, retrying per failure class, until all tasks
    /// completed, were dropped as not-found, or exhausted the attempt cap.
    pub async fn fetch_all(&self, identifiers: Vec<PostIdentifier>) -> FetchOutcome {
        if identifiers.is_empty() {
            return FetchOutcome::default();
        }
        log::info!("Downloading {} posts", identifiers.len());

        let queue: VecDeque<FetchTask> = identifiers
            .into_iter()
            .enumerate()
            .map(|(sequence, identifier)| FetchTask::new(sequence, identifier))
            .collect();
        let state = Arc::new(Mutex::new(PoolState {
            queue,
            in_flight: 0,
            resume_at: None,
        }));
        let bundles = Arc::new(Mutex::new(Vec::new()));
        let not_found = Arc::new(Mutex::new(Vec::new()));
        let dropped = AtomicUsize::new(0);

        let workers = (0..self.concurrency)
            .map(|_| self.worker(&state, &bundles, &not_found, &dropped));
        join_all(workers).await;

        let bundles = std::mem::take(&mut *bundles.lock().await);
        let not_found = std::mem::take(&mut *not_found.lock().await);
        FetchOutcome {
            bundles,
            not_found,
            dropped: dropped.load(Ordering::Relaxed),
        }
    }

    async fn worker(
        &self,
        state: &Mutex<PoolState>,
        bundles: &Mutex<Vec<PostBundle>>,
        not_found: &Mutex<Vec<PostIdentifier>>,
        dropped: &AtomicUsize,
    ) {
        // Poll interval while waiting for in-flight tasks that may requeue
        let idle = Duration::from_millis(20);

        loop {
            let task = {
                let mut st = state.lock().await;
                match st.resume_at {
                    Some(at) if Instant::now() < at => {
                        drop(st);
                        sleep_until(at).await;
                        continue;
                    }
                    Some(_) => st.resume_at = None,
                    None => {}
                }
                if let Some(task) = st.queue.pop_front() {
                    st.in_flight += 1;
                    Some(task)
                } else if st.in_flight == 0 {
                    return;
                } else {
                    None
                }
            };
            let Some(task) = task else {
                sleep(idle).await;
                continue;
            };

            match self.fetch_bundle(&task.identifier).await {
                Ok(bundle) => {
                    log::info!(
                        "Post {:>5}: {:>5} of {:>5} comments",
                        task.sequence + 1,
                        bundle.comments.len(),
                        bundle.post.comment_count
                    );
                    bundles.lock().await.push(bundle);
                    state.lock().await.in_flight -= 1;
                }
                Err(e) => {
                    let class = e.class();
                    log::error!("Post {:>5}: {e}", task.sequence + 1);
                    match class {
                        FailureClass::NotFound => {
                            let mut st = state.lock().await;
                            st.in_flight -= 1;
                            drop(st);
                            not_found.lock().await.push(task.identifier);
                        }
                        FailureClass::RateLimited => {
                            let resume = Instant::now() + self.rate_limit_wait;
                            let mut st = state.lock().await;
                            self.requeue_or_drop(&mut st.queue, task, dropped);
                            // Keep the later deadline if a pause is already set
                            st.resume_at = Some(match st.resume_at {
                                Some(at) if at > resume => at,
                                _ => resume,
                            });
                            st.in_flight -= 1;
                        }
                        FailureClass::Transport => {
                            {
                                let mut st = state.lock().await;
                                self.requeue_or_drop(&mut st.queue, task, dropped);
                                st.in_flight -= 1;
                            }
                            sleep(self.transport_wait).await;
                        }
                        FailureClass::Other => {
                            let mut st = state.lock().await;
                            self.requeue_or_drop(&mut st.queue, task, dropped);
                            st.in_flight -= 1;
                        }
                    }
                }
            }
        }
    }

    fn requeue_or_drop(
        &self,
        queue: &mut VecDeque<FetchTask>,
        task: FetchTask,
        dropped: &AtomicUsize,
    ) {
        if self.retry.allows(task.attempt + 1) {
            queue.push_back(task.requeued());
        } else {
            log::error!(
                "Post {:>5}: dropped after {} attempts",
                task.sequence + 1,
                task.attempt + 1
            );
            dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Fetch one post and, when it has comments, its comment set.
    async fn fetch_bundle(&self, identifier: &PostIdentifier) -> Result<PostBundle> {
        let post = match self.post_lookup {
            PostLookup::Id if !identifier.id.is_empty() => {
                let raw = self.client.post_by_id(&identifier.id).await?;
                normalize::post_from_session(&raw)?
            }
            _ => {
                let raw = self.client.post_by_shortcode(&identifier.shortcode).await?;
                normalize::post_from_web(&raw)?
            }
        };

        let comments = if post.comment_count > 0 {
            match self.comment_detail {
                CommentDetail::Standard => self.client.comments(&post.shortcode, &post.id).await?,
                CommentDetail::Extended => self.client.comments_extended(&post.id).await?,
            }
        } else {
            Vec::new()
        };

        Ok(PostBundle { post, comments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::error::AppError;
    use crate::models::{Comment, Query};
    use crate::services::platform::ListingPage;

    /// Per-shortcode scripted behavior.
    #[derive(Clone, Copy)]
    enum Behavior {
        Ok { comment_count: i64 },
        FailOnce(u16),
        AlwaysFail(u16),
        TransportOnce,
    }

    struct ScriptedPosts {
        behaviors: HashMap<String, Behavior>,
        attempts: StdMutex<HashMap<String, u32>>,
        /// (shortcode, request start) per post fetch
        calls: StdMutex<Vec<(String, Instant)>>,
        /// Applied to successful fetches only
        success_delay: Duration,
    }

    impl ScriptedPosts {
        fn new(behaviors: HashMap<String, Behavior>, success_delay: Duration) -> Self {
            Self {
                behaviors,
                attempts: StdMutex::new(HashMap::new()),
                calls: StdMutex::new(Vec::new()),
                success_delay,
            }
        }

        fn web_post(shortcode: &str, comment_count: i64) -> Value {
            json!({
                "id": format!("id_{shortcode}"),
                "shortcode": shortcode,
                "taken_at_timestamp": 1_700_000_000,
                "owner": {"username": "author"},
                "edge_media_to_caption": {"edges": []},
                "edge_media_preview_like": {"count": 1},
                "edge_media_to_comment": {"count": comment_count}
            })
        }
    }

    #[async_trait]
    impl PlatformApi for ScriptedPosts {
        async fn list_page(&self, _query: &Query, _cursor: Option<&str>) -> Result<ListingPage> {
            unreachable!("not used by the pool")
        }

        async fn post_by_id(&self, _id: &str) -> Result<Value> {
            unreachable!("tests use the shortcode path")
        }

        async fn post_by_shortcode(&self, shortcode: &str) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push((shortcode.to_string(), Instant::now()));
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let entry = attempts.entry(shortcode.to_string()).or_insert(0);
                *entry += 1;
                *entry
            };
            let behavior = self
                .behaviors
                .get(shortcode)
                .copied()
                .unwrap_or(Behavior::Ok { comment_count: 0 });
            let comment_count = match behavior {
                Behavior::Ok { comment_count } => comment_count,
                Behavior::FailOnce(code) if attempt == 1 => {
                    return Err(AppError::api(code, "scripted failure"))
                }
                Behavior::FailOnce(_) => 0,
                Behavior::AlwaysFail(code) => return Err(AppError::api(code, "scripted failure")),
                Behavior::TransportOnce if attempt == 1 => {
                    return Err(AppError::protocol("connection reset"))
                }
                Behavior::TransportOnce => 0,
            };
            sleep(self.success_delay).await;
            Ok(Self::web_post(shortcode, comment_count))
        }

        async fn comments(&self, shortcode: &str, post_id: &str) -> Result<Vec<Comment>> {
            Ok(vec![
                Comment {
                    id: format!("c1_{shortcode}"),
                    post_id: post_id.to_string(),
                    author: "fan".to_string(),
                    text: "first".to_string(),
                    created_at: 1_700_000_100,
                    raw: Value::Null,
                },
                Comment {
                    id: format!("c2_{shortcode}"),
                    post_id: post_id.to_string(),
                    author: "fan2".to_string(),
                    text: "second".to_string(),
                    created_at: 1_700_000_200,
                    raw: Value::Null,
                },
            ])
        }

        async fn comments_extended(&self, _post_id: &str) -> Result<Vec<Comment>> {
            unreachable!("tests use standard comment detail")
        }
    }

    fn identifiers(n: usize) -> Vec<PostIdentifier> {
        (1..=n)
            .map(|i| PostIdentifier {
                id: format!("id_{i}"),
                shortcode: format!("{i}"),
                discovered_at: 0,
            })
            .collect()
    }

    fn pool(client: Arc<ScriptedPosts>, concurrency: usize, rate_wait_ms: u64) -> FetchPool {
        FetchPool::new(
            client,
            concurrency,
            Duration::from_millis(rate_wait_ms),
            Duration::from_millis(1),
            RetryPolicy {
                wait: Duration::from_millis(1),
                max_attempts: None,
            },
            PostLookup::Shortcode,
            CommentDetail::Standard,
        )
    }

    #[tokio::test]
    async fn test_all_tasks_complete() {
        let client = Arc::new(ScriptedPosts::new(HashMap::new(), Duration::ZERO));
        let outcome = pool(client, 3, 10).fetch_all(identifiers(8)).await;
        assert_eq!(outcome.bundles.len(), 8);
        assert!(outcome.not_found.is_empty());
        assert_eq!(outcome.dropped, 0);
    }

    #[tokio::test]
    async fn test_comments_fetched_when_count_nonzero() {
        let mut behaviors = HashMap::new();
        behaviors.insert("1".to_string(), Behavior::Ok { comment_count: 2 });
        let client = Arc::new(ScriptedPosts::new(behaviors, Duration::ZERO));
        let outcome = pool(client, 2, 10).fetch_all(identifiers(2)).await;

        let with_comments = outcome
            .bundles
            .iter()
            .find(|b| b.post.shortcode == "1")
            .unwrap();
        assert_eq!(with_comments.comments.len(), 2);
        assert_eq!(with_comments.comments[0].post_id, "id_1");

        let without = outcome
            .bundles
            .iter()
            .find(|b| b.post.shortcode == "2")
            .unwrap();
        assert!(without.comments.is_empty());
    }

    #[tokio::test]
    async fn test_not_found_is_terminal_and_reported() {
        let mut behaviors = HashMap::new();
        behaviors.insert("4".to_string(), Behavior::AlwaysFail(404));
        let client = Arc::new(ScriptedPosts::new(behaviors, Duration::ZERO));
        let outcome = pool(client.clone(), 3, 10).fetch_all(identifiers(6)).await;

        assert_eq!(outcome.bundles.len(), 5);
        assert!(outcome.bundles.iter().all(|b| b.post.shortcode != "4"));
        assert_eq!(outcome.not_found.len(), 1);
        assert_eq!(outcome.not_found[0].shortcode, "4");
        // Never retried
        assert_eq!(client.attempts.lock().unwrap()["4"], 1);
    }

    #[tokio::test]
    async fn test_rate_limit_pauses_whole_pool() {
        let mut behaviors = HashMap::new();
        // Task 3 fails fast with a rate limit; every success takes 50ms,
        // so the failure lands while the first wave is still in flight.
        behaviors.insert("3".to_string(), Behavior::FailOnce(429));
        let client = Arc::new(ScriptedPosts::new(behaviors, Duration::from_millis(50)));
        let rate_wait = Duration::from_millis(200);
        let outcome = pool(client.clone(), 3, 200).fetch_all(identifiers(10)).await;

        // The rate-limited task was retried and completed
        assert_eq!(outcome.bundles.len(), 10);
        assert!(outcome.bundles.iter().any(|b| b.post.shortcode == "3"));

        let calls = client.calls.lock().unwrap();
        let failed_at = calls.iter().find(|(sc, _)| sc == "3").unwrap().1;
        // No task may start between the rate-limit signal and the end of
        // the pool-wide pause. Requests already in flight are exempt; they
        // all started before the failure returned.
        let margin = Duration::from_millis(20);
        for (sc, started) in calls.iter() {
            if *started > failed_at + margin {
                assert!(
                    *started >= failed_at + rate_wait - margin,
                    "task {sc} started during the pool-wide pause"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_transport_failure_requeues_task() {
        let mut behaviors = HashMap::new();
        behaviors.insert("2".to_string(), Behavior::TransportOnce);
        let client = Arc::new(ScriptedPosts::new(behaviors, Duration::ZERO));
        let outcome = pool(client.clone(), 2, 10).fetch_all(identifiers(4)).await;

        assert_eq!(outcome.bundles.len(), 4);
        assert_eq!(client.attempts.lock().unwrap()["2"], 2);
    }

    #[tokio::test]
    async fn test_other_client_error_requeues_without_pool_pause() {
        let mut behaviors = HashMap::new();
        behaviors.insert("2".to_string(), Behavior::FailOnce(500));
        let client = Arc::new(ScriptedPosts::new(behaviors, Duration::ZERO));
        let outcome = pool(client.clone(), 2, 60_000).fetch_all(identifiers(4)).await;

        // A 60s pool pause would hang this test; a 500 must not trigger it
        assert_eq!(outcome.bundles.len(), 4);
        assert_eq!(client.attempts.lock().unwrap()["2"], 2);
    }

    #[tokio::test]
    async fn test_attempt_cap_drops_task() {
        let mut behaviors = HashMap::new();
        behaviors.insert("1".to_string(), Behavior::AlwaysFail(500));
        let client = Arc::new(ScriptedPosts::new(behaviors, Duration::ZERO));
        let pool = FetchPool::new(
            client.clone(),
            2,
            Duration::from_millis(1),
            Duration::from_millis(1),
            RetryPolicy {
                wait: Duration::from_millis(1),
                max_attempts: Some(3),
            },
            PostLookup::Shortcode,
            CommentDetail::Standard,
        );
        let outcome = pool.fetch_all(identifiers(3)).await;

        assert_eq!(outcome.bundles.len(), 2);
        assert_eq!(outcome.dropped, 1);
        // Capped-out tasks are not deletion signals
        assert!(outcome.not_found.is_empty());
        assert_eq!(client.attempts.lock().unwrap()["1"], 3);
    }

    #[tokio::test]
    async fn test_empty_input_drains_immediately() {
        let client = Arc::new(ScriptedPosts::new(HashMap::new(), Duration::ZERO));
        let outcome = pool(client, 4, 10).fetch_all(Vec::new()).await;
        assert!(outcome.bundles.is_empty());
        assert!(outcome.not_found.is_empty());
    }
}
