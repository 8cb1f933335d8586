//! Message channels between the pipeline stages
//!
//! Both channels are Redis streams read through consumer groups: entries stay
//! pending until acknowledged, which gives at-least-once delivery.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::RecomputeTrigger;

pub mod stream;

pub use stream::{StreamConsumer, StreamPublisher};

/// Stream field holding each entry's body
pub const PAYLOAD_FIELD: &str = "payload";

/// One delivered stream entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Stream entry id, used for acknowledgement
    pub id: String,
    pub payload: String,
}

impl StreamEntry {
    pub fn new(id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }
}

/// Outbound channel for recompute triggers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TriggerSink: Send + Sync {
    async fn emit(&self, trigger: &RecomputeTrigger) -> AppResult<()>;
}

/// Consumer-group side of a stream
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntrySource: Send + Sync {
    /// Creates the consumer group (and the stream) unless it already exists
    async fn ensure_group(&self) -> AppResult<()>;

    /// Reads up to `count` new entries, blocking for at most `block`
    async fn read(&self, count: usize, block: Duration) -> AppResult<Vec<StreamEntry>>;

    /// Takes over up to `count` entries that have sat unacknowledged for at
    /// least `min_idle`, whichever consumer they were delivered to
    async fn reclaim(&self, count: usize, min_idle: Duration) -> AppResult<Vec<StreamEntry>>;

    async fn ack(&self, ids: &[String]) -> AppResult<()>;

    /// Moves entries delivered `max_deliveries` times or more to the
    /// dead-letter stream and acknowledges them
    ///
    /// Returns how many entries were moved.
    async fn dead_letter_exhausted(
        &self,
        entries: &[StreamEntry],
        max_deliveries: usize,
    ) -> AppResult<usize>;
}
