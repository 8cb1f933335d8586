//! Stream workers driving the pipeline stages
//!
//! A worker reads entries from one consumer group and hands each read to its
//! [`BatchHandler`] as a single invocation. Entries are acknowledged only when
//! the invocation succeeds; failed entries stay pending, are reclaimed once
//! idle, and move to the dead-letter stream after too many deliveries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::channel::{EntrySource, StreamEntry};
use crate::error::{AppError, AppResult};
use crate::models::RecomputeTrigger;
use crate::services::{FeedGenerator, PreferenceAggregator};

pub mod stats;

pub use stats::{PipelineStats, StatsSnapshot};

/// Pause after a failed stream call before trying again
const READ_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Configuration for one stream worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Entries handed to the handler per invocation
    pub batch_size: usize,
    /// How long a read blocks waiting for entries
    pub block: Duration,
    /// Idle time after which a pending entry is reclaimed; also the reclaim period
    pub claim_idle: Duration,
    /// Deliveries after which a failing entry is dead-lettered
    pub max_deliveries: usize,
    /// Deadline for one invocation
    pub invocation_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            block: Duration::from_millis(5_000),
            claim_idle: Duration::from_millis(60_000),
            max_deliveries: 5,
            invocation_timeout: Duration::from_millis(30_000),
        }
    }
}

/// What one successful invocation did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Processed {
    pub events: usize,
    pub triggers: usize,
    pub feeds: usize,
}

/// One pipeline stage, invoked once per stream read
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Processes every entry or fails as a whole
    async fn handle(&self, entries: &[StreamEntry]) -> AppResult<Processed>;
}

#[async_trait]
impl BatchHandler for PreferenceAggregator {
    fn name(&self) -> &'static str {
        "preference-aggregator"
    }

    async fn handle(&self, entries: &[StreamEntry]) -> AppResult<Processed> {
        let payloads: Vec<&str> = entries.iter().map(|e| e.payload.as_str()).collect();
        let outcome = self.handle_batch(payloads.as_slice()).await?;

        Ok(Processed {
            events: outcome.events,
            triggers: outcome.triggers.len(),
            feeds: 0,
        })
    }
}

#[async_trait]
impl BatchHandler for FeedGenerator {
    fn name(&self) -> &'static str {
        "feed-generator"
    }

    async fn handle(&self, entries: &[StreamEntry]) -> AppResult<Processed> {
        let triggers = entries
            .iter()
            .map(|e| RecomputeTrigger::from_payload(&e.payload))
            .collect::<AppResult<Vec<_>>>()?;

        // Repeated triggers in one read would only redo the same work
        let mut user_ids: Vec<String> = Vec::with_capacity(triggers.len());
        for trigger in triggers {
            if !user_ids.contains(&trigger.user_id) {
                user_ids.push(trigger.user_id);
            }
        }

        for user_id in &user_ids {
            self.regenerate(user_id).await?;
        }

        Ok(Processed {
            events: entries.len(),
            triggers: 0,
            feeds: user_ids.len(),
        })
    }
}

/// Runs `handler` over `entries` under a deadline
pub async fn invoke<H: BatchHandler + ?Sized>(
    handler: &H,
    entries: &[StreamEntry],
    deadline: Duration,
) -> AppResult<Processed> {
    match tokio::time::timeout(deadline, handler.handle(entries)).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(deadline)),
    }
}

/// Consumer-group loop feeding one handler
pub struct StreamWorker<H> {
    consumer: Arc<dyn EntrySource>,
    handler: Arc<H>,
    settings: WorkerSettings,
    stats: Arc<PipelineStats>,
}

impl<H: BatchHandler + 'static> StreamWorker<H> {
    pub fn new(
        consumer: Arc<dyn EntrySource>,
        handler: Arc<H>,
        settings: WorkerSettings,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            consumer,
            handler,
            settings,
            stats,
        }
    }

    /// Reads and processes entries until `shutdown` flips to `true`
    ///
    /// An in-flight invocation is allowed to finish before returning. Idle
    /// pending entries are reclaimed between reads, never in place of one.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> AppResult<()> {
        let name = self.handler.name();

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            match self.consumer.ensure_group().await {
                Ok(()) => break,
                Err(e) => {
                    error!(worker = name, error = %e, "Consumer group setup failed, retrying");
                    self.stats.record_channel_error();
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(READ_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!(
            worker = name,
            batch_size = self.settings.batch_size,
            "Stream worker started"
        );

        let reclaim_every = self.settings.claim_idle.max(Duration::from_millis(1));
        let mut next_reclaim = Instant::now();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let read = if Instant::now() >= next_reclaim {
                next_reclaim = Instant::now() + reclaim_every;
                self.consumer
                    .reclaim(self.settings.batch_size, self.settings.claim_idle)
                    .await
            } else {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    read = self.consumer.read(self.settings.batch_size, self.settings.block) => read,
                }
            };

            let entries = match read {
                Ok(entries) => entries,
                Err(e) => {
                    error!(worker = name, error = %e, "Stream read failed");
                    self.stats.record_channel_error();
                    tokio::time::sleep(READ_ERROR_BACKOFF).await;
                    continue;
                }
            };

            if entries.is_empty() {
                continue;
            }

            let span = tracing::info_span!(
                "invocation",
                worker = name,
                invocation_id = %Uuid::new_v4(),
                entries = entries.len()
            );
            self.process(&entries).instrument(span).await;
        }

        info!(worker = name, "Stream worker stopped");
        Ok(())
    }

    async fn process(&self, entries: &[StreamEntry]) {
        match invoke(self.handler.as_ref(), entries, self.settings.invocation_timeout).await {
            Ok(processed) => {
                self.stats.record_success(&processed);

                let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
                match self.consumer.ack(&ids).await {
                    Ok(()) => self.stats.record_acked(ids.len()),
                    Err(e) => {
                        // Entries will be reclaimed and processed again
                        warn!(error = %e, "Ack failed");
                        self.stats.record_channel_error();
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Invocation failed, entries left pending");
                self.stats.record_failure();

                match self
                    .consumer
                    .dead_letter_exhausted(entries, self.settings.max_deliveries)
                    .await
                {
                    Ok(0) => {}
                    Ok(moved) => self.stats.record_dead_lettered(moved),
                    Err(e) => {
                        warn!(error = %e, "Dead-letter check failed");
                        self.stats.record_channel_error();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{MemoryCatalog, MemoryFeedStore, MemoryPreferenceStore};
    use crate::db::{FeedStore, PreferenceStore};
    use crate::models::UserPreferenceProfile;
    use crate::channel::MockEntrySource;
    use crate::services::{FeedSettings, RetryPolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(id: &str, payload: &str) -> StreamEntry {
        StreamEntry::new(id, payload)
    }

    fn feed_generator(
        preferences: Arc<MemoryPreferenceStore>,
        feeds: Arc<MemoryFeedStore>,
    ) -> FeedGenerator {
        FeedGenerator::new(
            preferences,
            Arc::new(MemoryCatalog::new(vec![], vec![], 10)),
            feeds,
            RetryPolicy::new(1, Duration::ZERO),
            FeedSettings::default(),
        )
    }

    struct SlowHandler;

    #[async_trait]
    impl BatchHandler for SlowHandler {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn handle(&self, _entries: &[StreamEntry]) -> AppResult<Processed> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Processed::default())
        }
    }

    #[tokio::test]
    async fn test_invoke_times_out_slow_handler() {
        let deadline = Duration::from_millis(20);
        let result = invoke(&SlowHandler, &[entry("1-0", "u1")], deadline).await;
        assert!(matches!(result, Err(AppError::Timeout(d)) if d == deadline));
    }

    #[tokio::test]
    async fn test_invoke_passes_result_through() {
        let mut handler = MockBatchHandler::new();
        handler.expect_handle().times(1).returning(|entries| {
            Ok(Processed {
                events: entries.len(),
                ..Processed::default()
            })
        });

        let processed = invoke(
            &handler,
            &[entry("1-0", "a"), entry("2-0", "b")],
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(processed.events, 2);
    }

    #[tokio::test]
    async fn test_aggregator_handler_counts_events() {
        let store = Arc::new(MemoryPreferenceStore::new());
        let sink = Arc::new(crate::db::memory::MemoryTriggerSink::new());
        let aggregator =
            PreferenceAggregator::new(store.clone(), sink, RetryPolicy::default(), 35.0);

        let processed = aggregator
            .handle(&[
                entry("1-0", r#"{"userId":"u1","genres":["Drama"],"updateWeight":40,"changeWeight":1}"#),
                entry("2-0", r#"{"userId":"u2","actors":["A"],"updateWeight":1,"changeWeight":1}"#),
            ])
            .await
            .unwrap();

        assert_eq!(processed.events, 2);
        assert_eq!(processed.triggers, 1);
        assert!(store.load("u2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_feed_handler_dedups_users() {
        let preferences = Arc::new(MemoryPreferenceStore::new());
        preferences.insert(UserPreferenceProfile::empty("u1")).await;
        let feeds = Arc::new(MemoryFeedStore::new());
        let generator = feed_generator(preferences, feeds.clone());

        let processed = generator
            .handle(&[entry("1-0", "u1"), entry("2-0", " u1 ")])
            .await
            .unwrap();

        assert_eq!(processed.events, 2);
        assert_eq!(processed.feeds, 1);
        assert!(feeds.get("u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_feed_handler_rejects_blank_trigger() {
        let generator = feed_generator(
            Arc::new(MemoryPreferenceStore::new()),
            Arc::new(MemoryFeedStore::new()),
        );

        let result = generator.handle(&[entry("1-0", "  ")]).await;
        assert!(matches!(result, Err(AppError::MalformedEvent(_))));
    }

    #[tokio::test]
    async fn test_feed_handler_fails_on_missing_profile() {
        let feeds = Arc::new(MemoryFeedStore::new());
        let generator = feed_generator(Arc::new(MemoryPreferenceStore::new()), feeds.clone());

        let result = generator.handle(&[entry("1-0", "ghost")]).await;

        assert!(matches!(result, Err(AppError::ProfileNotFound(_))));
        assert!(feeds.get("ghost").await.unwrap().is_none());
    }

    fn ids(entries: &[StreamEntry]) -> Vec<String> {
        entries.iter().map(|e| e.id.clone()).collect()
    }

    fn worker(
        consumer: MockEntrySource,
        handler: MockBatchHandler,
        stats: Arc<PipelineStats>,
    ) -> StreamWorker<MockBatchHandler> {
        let mut handler = handler;
        handler.expect_name().return_const("test");
        StreamWorker::new(
            Arc::new(consumer),
            Arc::new(handler),
            WorkerSettings::default(),
            stats,
        )
    }

    #[tokio::test]
    async fn test_successful_invocation_acks_every_entry() {
        let entries = vec![entry("1-0", "a"), entry("2-0", "b")];
        let expected = ids(&entries);

        let mut consumer = MockEntrySource::new();
        consumer
            .expect_ack()
            .times(1)
            .withf(move |acked| acked == expected.as_slice())
            .returning(|_| Ok(()));
        consumer.expect_dead_letter_exhausted().never();

        let mut handler = MockBatchHandler::new();
        handler.expect_handle().times(1).returning(|entries| {
            Ok(Processed {
                events: entries.len(),
                ..Processed::default()
            })
        });

        let stats = Arc::new(PipelineStats::new());
        worker(consumer, handler, stats.clone()).process(&entries).await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.invocations_succeeded, 1);
        assert_eq!(snapshot.entries_acked, 2);
        assert_eq!(snapshot.events_applied, 2);
    }

    #[tokio::test]
    async fn test_failed_invocation_leaves_entries_pending() {
        let mut consumer = MockEntrySource::new();
        consumer.expect_ack().never();
        consumer
            .expect_dead_letter_exhausted()
            .times(1)
            .withf(|entries, max| entries.len() == 2 && *max == 5)
            .returning(|_, _| Ok(0));

        let mut handler = MockBatchHandler::new();
        handler
            .expect_handle()
            .returning(|_| Err(AppError::Internal("boom".to_string())));

        let stats = Arc::new(PipelineStats::new());
        worker(consumer, handler, stats.clone())
            .process(&[entry("1-0", "a"), entry("2-0", "b")])
            .await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.invocations_failed, 1);
        assert_eq!(snapshot.entries_acked, 0);
        assert_eq!(snapshot.dead_lettered, 0);
    }

    #[tokio::test]
    async fn test_exhausted_entries_are_counted_as_dead_lettered() {
        let mut consumer = MockEntrySource::new();
        consumer.expect_ack().never();
        consumer
            .expect_dead_letter_exhausted()
            .times(1)
            .returning(|_, _| Ok(1));

        let mut handler = MockBatchHandler::new();
        handler
            .expect_handle()
            .returning(|_| Err(AppError::Internal("boom".to_string())));

        let stats = Arc::new(PipelineStats::new());
        worker(consumer, handler, stats.clone())
            .process(&[entry("1-0", "a")])
            .await;

        assert_eq!(stats.snapshot().dead_lettered, 1);
    }

    #[tokio::test]
    async fn test_run_retries_group_setup_then_reads_until_shutdown() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);

        let mut consumer = MockEntrySource::new();
        let setups = AtomicUsize::new(0);
        consumer.expect_ensure_group().times(2).returning(move || {
            if setups.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::Internal("connection refused".to_string()))
            } else {
                Ok(())
            }
        });
        // Only the first pass reclaims; the next one is a full claim_idle away
        consumer
            .expect_reclaim()
            .times(1)
            .returning(|_, _| Ok(vec![]));
        let reads = AtomicUsize::new(0);
        let tx = shutdown_tx.clone();
        consumer.expect_read().times(2).returning(move |_, _| {
            if reads.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(vec![StreamEntry::new("1-0", "a")])
            } else {
                let _ = tx.send(true);
                Ok(vec![])
            }
        });
        consumer
            .expect_ack()
            .times(1)
            .withf(|acked| acked == ["1-0".to_string()])
            .returning(|_| Ok(()));

        let mut handler = MockBatchHandler::new();
        handler
            .expect_handle()
            .times(1)
            .returning(|_| Ok(Processed::default()));

        let stats = Arc::new(PipelineStats::new());
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            worker(consumer, handler, stats.clone()).run(shutdown_rx),
        )
        .await
        .unwrap();

        assert!(result.is_ok());
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.channel_errors, 1);
        assert_eq!(snapshot.entries_acked, 1);
    }

    #[tokio::test]
    async fn test_run_stops_during_group_setup_retries() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut consumer = MockEntrySource::new();
        consumer
            .expect_ensure_group()
            .returning(|| Err(AppError::Internal("connection refused".to_string())));
        consumer.expect_read().never();

        let handle = tokio::spawn(
            worker(consumer, MockBatchHandler::new(), Arc::new(PipelineStats::new()))
                .run(shutdown_rx),
        );
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
