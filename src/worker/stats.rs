//! Process-wide counters for the pipeline workers

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use super::Processed;

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub invocations_succeeded: u64,
    pub invocations_failed: u64,
    pub entries_acked: u64,
    pub events_applied: u64,
    pub triggers_emitted: u64,
    pub feeds_written: u64,
    pub dead_lettered: u64,
    pub channel_errors: u64,
}

/// Thread-safe counters shared by every worker
#[derive(Debug, Default)]
pub struct PipelineStats {
    invocations_succeeded: AtomicU64,
    invocations_failed: AtomicU64,
    entries_acked: AtomicU64,
    events_applied: AtomicU64,
    triggers_emitted: AtomicU64,
    feeds_written: AtomicU64,
    dead_lettered: AtomicU64,
    channel_errors: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, processed: &Processed) {
        self.invocations_succeeded.fetch_add(1, Ordering::Relaxed);
        self.events_applied
            .fetch_add(processed.events as u64, Ordering::Relaxed);
        self.triggers_emitted
            .fetch_add(processed.triggers as u64, Ordering::Relaxed);
        self.feeds_written
            .fetch_add(processed.feeds as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.invocations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acked(&self, count: usize) {
        self.entries_acked.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self, count: usize) {
        self.dead_lettered.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Failed stream read, ack or dead-letter call
    pub fn record_channel_error(&self) {
        self.channel_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            invocations_succeeded: self.invocations_succeeded.load(Ordering::Relaxed),
            invocations_failed: self.invocations_failed.load(Ordering::Relaxed),
            entries_acked: self.entries_acked.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            triggers_emitted: self.triggers_emitted.load(Ordering::Relaxed),
            feeds_written: self.feeds_written.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            channel_errors: self.channel_errors.load(Ordering::Relaxed),
        }
    }
}
