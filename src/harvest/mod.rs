//! The harvest loop.
//!
//! Items are drained from a [`FetchableQueue`] one at a time. Each is checked
//! against the exclusion list and the [`FetchStrategy`], fetched, and its
//! capture records written in order. Discovered items go back on the queue
//! one level deeper, except those found by a type probe, which keep the
//! probe's depth.

pub mod queue;
pub mod strategy;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::{HttpClients, Result};
use crate::capture::{CaptureWriter, RecordType};
use crate::config::ServiceConfig;
use crate::domain::{FetchContext, Fetchable, FetchedSet};
use crate::store::HarvestStateStore;

pub use queue::{Depth, FetchableQueue};
pub use strategy::{DepthStrategy, FetchStrategy};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestStats {
    pub fetched: usize,
    pub rejected: usize,
    pub excluded: usize,
    pub records_written: usize,
    pub discovered: usize,
    pub errors: usize,
}

impl fmt::Display for HarvestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fetched, {} rejected, {} excluded, {} records written, {} discovered, {} errors",
            self.fetched,
            self.rejected,
            self.excluded,
            self.records_written,
            self.discovered,
            self.errors
        )
    }
}

pub struct Harvester {
    queue: FetchableQueue,
    strategy: Box<dyn FetchStrategy>,
    writer: Box<dyn CaptureWriter>,
    state: Box<dyn HarvestStateStore>,
    clients: HttpClients,
    services: HashMap<String, ServiceConfig>,
    fetched: FetchedSet,
    exclude: Vec<String>,
    wait: Duration,
    dry_run: bool,
}

impl Harvester {
    pub fn new(
        writer: Box<dyn CaptureWriter>,
        state: Box<dyn HarvestStateStore>,
        clients: HttpClients,
    ) -> Self {
        Self {
            queue: FetchableQueue::new(),
            strategy: Box::new(DepthStrategy::default()),
            writer,
            state,
            clients,
            services: HashMap::new(),
            fetched: FetchedSet::new(),
            exclude: Vec::new(),
            wait: Duration::ZERO,
            dry_run: false,
        }
    }

    pub fn with_strategy<S: FetchStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Pause after each fetched item.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Item kinds that are dropped without consulting the strategy.
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Tells items to leave consumable inputs in place.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_services(mut self, services: HashMap<String, ServiceConfig>) -> Self {
        self.services = services;
        self
    }

    /// Queues items at depth 1.
    pub fn seed<I: IntoIterator<Item = Fetchable>>(&mut self, items: I) {
        self.queue.add_all(items, 1);
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Drains the queue, then closes the writer and the state store.
    ///
    /// Both are closed exactly once whether or not the drain succeeded. A
    /// drain error takes precedence over close errors.
    pub async fn run(mut self) -> Result<HarvestStats> {
        let drained = self.drain().await;

        let writer_closed = self.writer.close();
        if let Err(ref e) = writer_closed {
            warn!("Closing capture writer failed: {}", e);
        }
        let state_closed = self.state.close();
        if let Err(ref e) = state_closed {
            warn!("Persisting harvest state failed: {}", e);
        }

        let stats = drained?;
        writer_closed?;
        state_closed?;
        info!(%stats, "Harvest finished");
        Ok(stats)
    }

    async fn drain(&mut self) -> Result<HarvestStats> {
        let mut stats = HarvestStats::default();

        while let Some((item, depth)) = self.queue.pop() {
            if self.exclude.iter().any(|kind| kind == item.kind()) {
                debug!(item = %item, "Excluded");
                stats.excluded += 1;
                continue;
            }
            if !self.strategy.decide(&item, depth) {
                stats.rejected += 1;
                continue;
            }

            info!(item = %item, depth, "Fetching");
            let fetched = {
                let mut ctx = FetchContext {
                    clients: &mut self.clients,
                    services: &self.services,
                    fetched: &mut self.fetched,
                    state: self.state.as_mut(),
                    dry_run: self.dry_run,
                };
                item.fetch(&mut ctx).await
            };

            match fetched {
                Ok(outcome) => {
                    stats.fetched += 1;
                    for record in &outcome.records {
                        self.writer.write(record)?;
                        stats.records_written += 1;
                        if record.record_type == RecordType::Response {
                            if let Some(ref uri) = record.target_uri {
                                self.fetched.mark_fetched(uri);
                            }
                        }
                    }

                    let child_depth = if item.resolves_type() { depth } else { depth + 1 };
                    if !outcome.discovered.is_empty() {
                        debug!(
                            item = %item,
                            count = outcome.discovered.len(),
                            depth = child_depth,
                            "Queueing discovered items"
                        );
                    }
                    stats.discovered += outcome.discovered.len();
                    self.queue.add_all(outcome.discovered, child_depth);
                }
                Err(e) => {
                    warn!(item = %item, depth, "Fetch failed: {}", e);
                    stats.errors += 1;
                }
            }

            if !self.wait.is_zero() {
                tokio::time::sleep(self.wait).await;
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::app::WeirError;
    use crate::capture::{CaptureRecord, MemoryWriter};
    use crate::domain::{FetchOutcome, Producer, ResourceKind, ResourceType};
    use crate::fetcher::mock::ScriptedClient;
    use crate::store::{MemoryStateStore, StateSnapshot};

    /// Counts closes so they can be checked after the harvester is consumed.
    struct CountingStore {
        inner: MemoryStateStore,
        closes: Arc<AtomicUsize>,
    }

    impl HarvestStateStore for CountingStore {
        fn get(&self, namespace: &str, key: &str) -> Option<String> {
            self.inner.get(namespace, key)
        }

        fn set(&mut self, namespace: &str, key: &str, value: Option<String>) {
            self.inner.set(namespace, key, value)
        }

        fn snapshot(&self) -> &StateSnapshot {
            self.inner.snapshot()
        }

        fn close(&mut self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.inner.close()
        }
    }

    struct FailingWriter;

    impl CaptureWriter for FailingWriter {
        fn write(&mut self, _record: &CaptureRecord) -> Result<()> {
            Err(WeirError::Capture("disk full".into()))
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// A feed that yields one request/response pair and one linked page.
    #[derive(Debug)]
    struct FakeFeed;

    #[async_trait]
    impl Producer for FakeFeed {
        fn kind(&self) -> &str {
            "fake_feed"
        }

        fn locator(&self) -> String {
            "fake://feed".into()
        }

        fn tags(&self) -> &[ResourceType] {
            &[ResourceType::Feed]
        }

        async fn fetch(&self, _ctx: &mut FetchContext<'_>) -> Result<FetchOutcome> {
            let request = CaptureRecord::request("fake://feed", "GET /feed HTTP/1.1\r\n");
            let response =
                CaptureRecord::response("fake://feed", "HTTP/1.1 200 OK\r\n", b"[]".to_vec(), &request);
            Ok(FetchOutcome::new(
                vec![request, response],
                vec![Fetchable::resource("http://linked/", ResourceKind::Html)],
            ))
        }
    }

    fn harvester(client: Arc<ScriptedClient>) -> (Harvester, MemoryWriter, Arc<AtomicUsize>) {
        let writer = MemoryWriter::new();
        let closes = Arc::new(AtomicUsize::new(0));
        let store = CountingStore {
            inner: MemoryStateStore::new(),
            closes: Arc::clone(&closes),
        };
        let harvester = Harvester::new(
            Box::new(writer.clone()),
            Box::new(store),
            HttpClients::fixed(client),
        );
        (harvester, writer, closes)
    }

    #[tokio::test]
    async fn test_seed_feed_child_rejected_at_depth_two() {
        let client = Arc::new(ScriptedClient::new());
        let (harvester, writer, state_closes) = harvester(Arc::clone(&client));
        let mut harvester = harvester.with_strategy(DepthStrategy::seeds_only());
        harvester.seed(vec![Fetchable::External(Box::new(FakeFeed))]);

        let stats = harvester.run().await.unwrap();

        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.records_written, 2);
        assert_eq!(stats.discovered, 1);
        assert_eq!(stats.rejected, 1);
        assert!(client.calls().is_empty());

        let capture = writer.handle();
        let capture = capture.lock().unwrap();
        assert_eq!(capture.records.len(), 2);
        assert_eq!(capture.closes, 1);
        assert_eq!(state_closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_probe_children_keep_depth() {
        let client = Arc::new(
            ScriptedClient::new()
                .with_head("http://a/", "text/html")
                .with_page("http://a/", "text/html", r#"<img src="/i.png">"#),
        );
        let (harvester, writer, _) = harvester(Arc::clone(&client));
        let mut harvester = harvester.with_strategy(DepthStrategy::seeds_only());
        harvester.seed(vec![Fetchable::unknown("http://a/")]);

        let stats = harvester.run().await.unwrap();

        // The probe resolves to a page still at depth 1; its image is at depth 2.
        assert_eq!(client.calls(), vec!["HEAD http://a/", "GET http://a/"]);
        assert_eq!(stats.fetched, 2);
        assert_eq!(stats.rejected, 1);
        assert_eq!(writer.handle().lock().unwrap().records.len(), 2);
    }

    #[tokio::test]
    async fn test_same_locator_fetched_once() {
        let client = Arc::new(ScriptedClient::new().with_page("http://a/i.png", "image/png", "png"));
        let (mut harvester, _, _) = harvester(Arc::clone(&client));
        harvester.seed(vec![
            Fetchable::resource("http://a/i.png", ResourceKind::Image),
            Fetchable::resource("http://a/i.png", ResourceKind::Image),
        ]);

        let stats = harvester.run().await.unwrap();

        assert_eq!(client.calls().len(), 1);
        assert_eq!(stats.records_written, 2);
    }

    #[tokio::test]
    async fn test_fetch_errors_are_contained() {
        let client = Arc::new(
            ScriptedClient::new()
                .with_failure("http://down/")
                .with_page("http://up/", "image/png", "png"),
        );
        let (mut harvester, _, _) = harvester(Arc::clone(&client));
        harvester.seed(vec![
            Fetchable::resource("http://down/", ResourceKind::Image),
            Fetchable::resource("http://up/", ResourceKind::Image),
        ]);

        let stats = harvester.run().await.unwrap();

        assert_eq!(stats.errors, 1);
        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.records_written, 2);
    }

    #[tokio::test]
    async fn test_excluded_kinds_skipped() {
        let client = Arc::new(ScriptedClient::new());
        let (harvester, _, _) = harvester(Arc::clone(&client));
        let mut harvester = harvester.with_exclude(vec!["image".into()]);
        harvester.seed(vec![Fetchable::resource("http://a/i.png", ResourceKind::Image)]);

        let stats = harvester.run().await.unwrap();

        assert_eq!(stats.excluded, 1);
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_writer_failure_still_closes_state() {
        let closes = Arc::new(AtomicUsize::new(0));
        let store = CountingStore {
            inner: MemoryStateStore::new(),
            closes: Arc::clone(&closes),
        };
        let mut harvester = Harvester::new(
            Box::new(FailingWriter),
            Box::new(store),
            HttpClients::fixed(Arc::new(ScriptedClient::new())),
        );
        harvester.seed(vec![Fetchable::External(Box::new(FakeFeed))]);

        assert!(harvester.run().await.is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_follows_fetched_items_only() {
        let client = Arc::new(ScriptedClient::new().with_page("http://a/i.png", "image/png", "png"));
        let (harvester, _, _) = harvester(Arc::clone(&client));
        let wait = Duration::from_millis(250);
        let mut harvester = harvester
            .with_strategy(DepthStrategy::seeds_only())
            .with_wait(wait);
        harvester.seed(vec![
            Fetchable::External(Box::new(FakeFeed)),
            Fetchable::resource("http://a/i.png", ResourceKind::Image),
        ]);

        let started = tokio::time::Instant::now();
        let stats = harvester.run().await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(stats.fetched, 2);
        assert_eq!(stats.rejected, 1);
        assert!(elapsed >= wait * 2, "waited {:?}", elapsed);
        assert!(elapsed < wait * 3, "waited {:?}", elapsed);
    }

    #[test]
    fn test_stats_display() {
        let stats = HarvestStats {
            fetched: 3,
            errors: 1,
            ..HarvestStats::default()
        };
        assert_eq!(
            stats.to_string(),
            "3 fetched, 0 rejected, 0 excluded, 0 records written, 0 discovered, 1 errors"
        );
    }
}
