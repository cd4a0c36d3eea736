//! In-memory store and fetcher doubles for pipeline and scheduler tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::feed::{FetchError, FetchFeed, RssChannel, RssDocument, RssItem};
use crate::storage::{CreatePostParams, DatabaseError, Feed, FeedStore, Post};

pub(crate) fn test_feed(name: &str) -> Feed {
    let now = Utc::now();
    Feed {
        id: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
        name: name.to_string(),
        url: format!("https://{}.example.com/rss", name.to_lowercase()),
        last_fetched_at: None,
    }
}

pub(crate) fn item(title: &str, pub_date: &str, description: &str) -> RssItem {
    RssItem {
        title: title.to_string(),
        link: format!("https://example.com/{title}"),
        description: description.to_string(),
        pub_date: pub_date.to_string(),
    }
}

/// Counts pipeline runs currently inside a fetch.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub(crate) fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub(crate) struct FakeStore {
    feeds: Vec<Feed>,
    fail_select: AtomicBool,
    fail_mark: HashSet<Uuid>,
    reject_urls: HashSet<String>,
    probe: Option<Arc<InFlight>>,
    select_calls: AtomicUsize,
    in_flight_at_select: Mutex<Vec<usize>>,
    marked: Mutex<Vec<Uuid>>,
    posts: Mutex<Vec<CreatePostParams>>,
}

impl FakeStore {
    pub(crate) fn with_feeds(feeds: Vec<Feed>) -> Self {
        Self {
            feeds,
            ..Self::default()
        }
    }

    pub(crate) fn fail_mark(mut self, feed_id: Uuid) -> Self {
        self.fail_mark.insert(feed_id);
        self
    }

    pub(crate) fn reject_url(mut self, url: &str) -> Self {
        self.reject_urls.insert(url.to_string());
        self
    }

    /// Record the fetcher's in-flight count each time a batch is selected.
    pub(crate) fn observe(mut self, probe: Arc<InFlight>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub(crate) fn set_fail_select(&self, fail: bool) {
        self.fail_select.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn select_calls(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn in_flight_at_select(&self) -> Vec<usize> {
        self.in_flight_at_select.lock().unwrap().clone()
    }

    pub(crate) fn marked(&self) -> Vec<Uuid> {
        self.marked.lock().unwrap().clone()
    }

    pub(crate) fn posts(&self) -> Vec<CreatePostParams> {
        self.posts.lock().unwrap().clone()
    }

    fn store_error() -> DatabaseError {
        DatabaseError::Other(sqlx::Error::PoolTimedOut)
    }
}

impl FeedStore for FakeStore {
    async fn select_due_feeds(&self, limit: usize) -> Result<Vec<Feed>, DatabaseError> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(probe) = &self.probe {
            self.in_flight_at_select.lock().unwrap().push(probe.current());
        }
        if self.fail_select.load(Ordering::SeqCst) {
            return Err(Self::store_error());
        }
        Ok(self.feeds.iter().take(limit).cloned().collect())
    }

    async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<Feed, DatabaseError> {
        if self.fail_mark.contains(&feed_id) {
            return Err(Self::store_error());
        }
        self.marked.lock().unwrap().push(feed_id);
        let mut feed = self
            .feeds
            .iter()
            .find(|f| f.id == feed_id)
            .cloned()
            .ok_or(DatabaseError::NotFound(feed_id))?;
        feed.last_fetched_at = Some(Utc::now());
        Ok(feed)
    }

    async fn insert_post(&self, params: CreatePostParams) -> Result<Post, DatabaseError> {
        if self.reject_urls.contains(&params.url) {
            return Err(DatabaseError::Constraint(
                "UNIQUE constraint failed: posts.url".to_string(),
            ));
        }
        let post = Post {
            id: params.id,
            created_at: params.created_at,
            updated_at: params.updated_at,
            title: params.title.clone(),
            description: params.description.clone(),
            published_at: params.published_at,
            url: params.url.clone(),
            feed_id: params.feed_id,
        };
        self.posts.lock().unwrap().push(params);
        Ok(post)
    }
}

/// Serves canned documents by URL; unknown URLs fail like an unreachable host.
#[derive(Default)]
pub(crate) struct FakeFetcher {
    documents: HashMap<String, Vec<RssItem>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: Arc<InFlight>,
}

impl FakeFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_items(mut self, url: &str, items: Vec<RssItem>) -> Self {
        self.documents.insert(url.to_string(), items);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn in_flight(&self) -> Arc<InFlight> {
        Arc::clone(&self.in_flight)
    }
}

impl FetchFeed for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<RssDocument, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight.enter();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.exit();

        match self.documents.get(url) {
            Some(items) => Ok(RssDocument {
                channel: RssChannel {
                    items: items.clone(),
                    ..RssChannel::default()
                },
            }),
            None => Err(FetchError::HttpStatus(502)),
        }
    }
}
