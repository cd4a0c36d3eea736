//! Polling scheduler.
//!
//! Drives the ingestion pipeline on a fixed cadence. Each tick selects up to
//! `concurrency` due feeds, runs one pipeline task per feed in parallel and
//! waits for all of them before the next tick is considered.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::feed::FetchFeed;
use crate::scraper::pipeline::run_pipeline;
use crate::storage::FeedStore;

/// Cadence and batch size for the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum feeds selected (and fetched concurrently) per tick
    pub concurrency: usize,
    /// Time between ticks
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            interval: Duration::from_secs(60),
        }
    }
}

/// Aggregate outcome of one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Feeds returned by the store (and dispatched)
    pub selected: usize,
    /// Runs that fetched and processed their document
    pub succeeded: usize,
    /// Runs aborted by a mark-fetched or fetch failure, or a panic
    pub failed: usize,
    /// Posts inserted across the whole batch
    pub posts_inserted: usize,
}

enum Message {
    Shutdown,
}

/// Handle to a running [`Scheduler`].
///
/// Dropping the handle also stops the scheduler after its current batch.
pub struct SchedulerHandle {
    sender: mpsc::Sender<Message>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask the driver to stop and wait for it to exit.
    ///
    /// A batch that is already running finishes first.
    pub async fn shutdown(self) {
        let _ = self.sender.send(Message::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Scheduler task ended abnormally");
        }
    }
}

/// Owns the store, the fetcher and the polling loop.
pub struct Scheduler<S, F> {
    store: Arc<S>,
    fetcher: Arc<F>,
    config: SchedulerConfig,
}

impl<S, F> Scheduler<S, F>
where
    S: FeedStore,
    F: FetchFeed,
{
    pub fn new(store: Arc<S>, fetcher: Arc<F>, config: SchedulerConfig) -> Self {
        let mut config = config;
        if config.concurrency == 0 {
            tracing::warn!("Concurrency of 0 would never fetch anything, using 1");
            config.concurrency = 1;
        }
        if config.interval.is_zero() {
            tracing::warn!("Zero tick interval, using 1s");
            config.interval = Duration::from_secs(1);
        }

        Self {
            store,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Spawn the polling loop on the current tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let (sender, receiver) = mpsc::channel(1);
        let task = tokio::spawn(self.run(receiver));
        SchedulerHandle { sender, task }
    }

    async fn run(self, mut receiver: mpsc::Receiver<Message>) {
        tracing::info!(
            concurrency = self.config.concurrency,
            interval = ?self.config.interval,
            "Scraping started"
        );

        // A batch that overruns the interval swallows the ticks it missed:
        // at most one fires when it finishes, the rest are dropped. Batches
        // never overlap and never queue up.
        let mut timer = tokio::time::interval(self.config.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // First tick completes immediately; the first batch waits a full interval
        timer.tick().await;

        loop {
            // Shutdown wins over a tick that became due during the last batch
            tokio::select! {
                biased;

                msg = receiver.recv() => {
                    match msg {
                        Some(Message::Shutdown) | None => {
                            tracing::info!("Scraping stopped");
                            break;
                        }
                    }
                }
                _ = timer.tick() => {
                    let report = self.run_tick().await;
                    tracing::debug!(
                        selected = report.selected,
                        succeeded = report.succeeded,
                        failed = report.failed,
                        posts_inserted = report.posts_inserted,
                        "Tick complete"
                    );
                }
            }
        }
    }

    /// Run one tick: select a batch, fetch every feed in it concurrently and
    /// wait for all runs to finish.
    ///
    /// Never fails. A selection error is logged and yields an empty report.
    pub async fn run_tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let feeds = match self.store.select_due_feeds(self.config.concurrency).await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::warn!(error = %e, "Error fetching feeds");
                return report;
            }
        };

        if feeds.is_empty() {
            tracing::debug!("No feeds due");
            return report;
        }

        if feeds.len() > self.config.concurrency {
            tracing::warn!(
                selected = feeds.len(),
                concurrency = self.config.concurrency,
                "Store returned more feeds than requested, dispatching all of them"
            );
        }

        report.selected = feeds.len();

        let mut tasks = JoinSet::new();
        for feed in feeds {
            let store = Arc::clone(&self.store);
            let fetcher = Arc::clone(&self.fetcher);
            tasks.spawn(async move { run_pipeline(store.as_ref(), fetcher.as_ref(), &feed).await });
        }

        // Barrier: the tick is over only when every run has returned
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    report.posts_inserted += result.inserted;
                    if result.is_success() {
                        report.succeeded += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Pipeline task panicked");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::testing::{item, test_feed, FakeFetcher, FakeStore};
    use pretty_assertions::assert_eq;

    const GOOD_DATE: &str = "Mon, 02 Jan 2006 15:04:05 -0700";

    fn config(concurrency: usize, secs: u64) -> SchedulerConfig {
        SchedulerConfig {
            concurrency,
            interval: Duration::from_secs(secs),
        }
    }

    #[tokio::test]
    async fn test_mixed_batch_isolates_failing_feed() {
        let feed_a = test_feed("FeedA");
        let feed_b = test_feed("FeedB");
        let store = Arc::new(FakeStore::with_feeds(vec![feed_a.clone(), feed_b.clone()]));
        let fetcher = Arc::new(FakeFetcher::new().with_items(
            &feed_a.url,
            vec![item("good", GOOD_DATE, ""), item("bad", "not a date", "")],
        ));

        let scheduler = Scheduler::new(Arc::clone(&store), fetcher, config(10, 60));
        let report = scheduler.run_tick().await;

        assert_eq!(
            report,
            TickReport {
                selected: 2,
                succeeded: 1,
                failed: 1,
                posts_inserted: 1,
            }
        );

        let mut marked = store.marked();
        marked.sort();
        let mut expected = vec![feed_a.id, feed_b.id];
        expected.sort();
        assert_eq!(marked, expected);

        let posts = store.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].feed_id, feed_a.id);
        assert_eq!(posts[0].title, "good");
    }

    #[tokio::test]
    async fn test_selection_error_dispatches_nothing() {
        let feed = test_feed("Blog");
        let store = Arc::new(FakeStore::with_feeds(vec![feed]));
        store.set_fail_select(true);
        let fetcher = Arc::new(FakeFetcher::new());

        let scheduler = Scheduler::new(Arc::clone(&store), Arc::clone(&fetcher), config(10, 60));
        let report = scheduler.run_tick().await;

        assert_eq!(report, TickReport::default());
        assert_eq!(fetcher.calls(), 0);
        assert!(store.marked().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_dispatches_nothing() {
        let store = Arc::new(FakeStore::default());
        let fetcher = Arc::new(FakeFetcher::new());

        let scheduler = Scheduler::new(store, Arc::clone(&fetcher), config(10, 60));
        assert_eq!(scheduler.run_tick().await, TickReport::default());
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_capped_at_concurrency() {
        let feeds: Vec<_> = (0..5).map(|i| test_feed(&format!("Feed{i}"))).collect();
        let store = Arc::new(FakeStore::with_feeds(feeds));
        let fetcher = Arc::new(FakeFetcher::new());

        let scheduler = Scheduler::new(Arc::clone(&store), Arc::clone(&fetcher), config(2, 60));
        let report = scheduler.run_tick().await;

        assert_eq!(report.selected, 2);
        assert_eq!(fetcher.calls(), 2);
    }

    #[test]
    fn test_zero_config_values_clamped() {
        let scheduler = Scheduler::new(
            Arc::new(FakeStore::default()),
            Arc::new(FakeFetcher::new()),
            SchedulerConfig {
                concurrency: 0,
                interval: Duration::ZERO,
            },
        );
        assert_eq!(scheduler.config().concurrency, 1);
        assert!(!scheduler.config().interval.is_zero());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_waits_one_interval() {
        let store = Arc::new(FakeStore::default());
        let handle = Scheduler::new(
            Arc::clone(&store),
            Arc::new(FakeFetcher::new()),
            config(10, 60),
        )
        .start();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.select_calls(), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.select_calls(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.select_calls(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_error_does_not_stop_loop() {
        let store = Arc::new(FakeStore::with_feeds(vec![test_feed("Blog")]));
        store.set_fail_select(true);
        let fetcher = Arc::new(FakeFetcher::new());
        let handle = Scheduler::new(Arc::clone(&store), Arc::clone(&fetcher), config(10, 60)).start();

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(store.select_calls(), 2);
        assert_eq!(fetcher.calls(), 0);

        store.set_fail_select(false);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.select_calls(), 3);
        assert_eq!(fetcher.calls(), 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_batches_never_overlap() {
        let feeds: Vec<_> = (0..6).map(|i| test_feed(&format!("Feed{i}"))).collect();
        let fetcher = Arc::new(FakeFetcher::new().with_delay(Duration::from_secs(150)));
        let probe = fetcher.in_flight();
        let store = Arc::new(FakeStore::with_feeds(feeds).observe(Arc::clone(&probe)));

        let handle = Scheduler::new(Arc::clone(&store), Arc::clone(&fetcher), config(3, 60)).start();

        // Ticks at 60s, then each time a 150s batch finishes (210s, 360s, ...)
        tokio::time::sleep(Duration::from_secs(400)).await;
        handle.shutdown().await;

        assert_eq!(store.select_calls(), 3);
        assert!(store.in_flight_at_select().iter().all(|&n| n == 0));
        assert_eq!(probe.max(), 3);
        assert_eq!(probe.current(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_running_batch() {
        let feed = test_feed("Slow");
        let fetcher = Arc::new(
            FakeFetcher::new()
                .with_items(&feed.url, vec![item("late", GOOD_DATE, "")])
                .with_delay(Duration::from_secs(30)),
        );
        let store = Arc::new(FakeStore::with_feeds(vec![feed]));
        let handle = Scheduler::new(Arc::clone(&store), fetcher, config(1, 60)).start();

        // Mid-batch: tick fired at 60s, fetch completes at 90s
        tokio::time::sleep(Duration::from_secs(70)).await;
        handle.shutdown().await;

        assert_eq!(store.posts().len(), 1);
        assert_eq!(store.select_calls(), 1);
    }
}
