use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{
    StreamId, StreamPendingCountReply, StreamRangeReply, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, Client};

use super::{EntrySource, StreamEntry, TriggerSink, PAYLOAD_FIELD};
use crate::error::AppResult;
use crate::models::RecomputeTrigger;

/// Name of the dead-letter stream paired with `stream`
pub fn dead_letter_stream(stream: &str) -> String {
    format!("{}:dead", stream)
}

fn to_entry(id: StreamId) -> StreamEntry {
    let payload: String = id.get(PAYLOAD_FIELD).unwrap_or_default();
    StreamEntry::new(id.id, payload)
}

/// Consumer-group reader for one stream
///
/// Holds a dedicated connection because `XREADGROUP ... BLOCK` would
/// otherwise hold up every other command multiplexed on it.
pub struct StreamConsumer {
    conn: MultiplexedConnection,
    stream: String,
    group: String,
    consumer: String,
}

impl StreamConsumer {
    pub async fn connect(
        client: &Client,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> AppResult<Self> {
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            conn,
            stream: stream.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
        })
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }
}

#[async_trait]
impl EntrySource for StreamConsumer {
    /// Creates the consumer group (and the stream) unless it already exists
    async fn ensure_group(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let created: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, "0")
            .await;

        match created {
            Ok(()) => {
                tracing::info!(stream = %self.stream, group = %self.group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, count: usize, block: Duration) -> AppResult<Vec<StreamEntry>> {
        let mut conn = self.conn.clone();
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(count)
            .block(block.as_millis() as usize);

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[self.stream.as_str()], &[">"], &options)
            .await?;

        Ok(reply
            .map(|reply| {
                reply
                    .keys
                    .into_iter()
                    .flat_map(|key| key.ids)
                    .map(to_entry)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn reclaim(&self, count: usize, min_idle: Duration) -> AppResult<Vec<StreamEntry>> {
        let mut conn = self.conn.clone();
        let reply: Vec<redis::Value> = redis::cmd("XAUTOCLAIM")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        // Reply is [next-start-id, claimed-entries, (deleted-ids)]
        let claimed = match reply.get(1) {
            Some(value) => redis::from_redis_value::<StreamRangeReply>(value)?.ids,
            None => Vec::new(),
        };

        if !claimed.is_empty() {
            tracing::info!(stream = %self.stream, reclaimed = claimed.len(), "Reclaimed idle entries");
        }

        Ok(claimed.into_iter().map(to_entry).collect())
    }

    async fn ack(&self, ids: &[String]) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: usize = conn.xack(&self.stream, &self.group, ids).await?;
        Ok(())
    }

    async fn dead_letter_exhausted(
        &self,
        entries: &[StreamEntry],
        max_deliveries: usize,
    ) -> AppResult<usize> {
        let mut conn = self.conn.clone();
        let dead_stream = dead_letter_stream(&self.stream);
        let mut moved = Vec::new();

        for entry in entries {
            let pending: StreamPendingCountReply = conn
                .xpending_count(&self.stream, &self.group, &entry.id, &entry.id, 1)
                .await?;

            let deliveries = pending
                .ids
                .first()
                .map(|p| p.times_delivered)
                .unwrap_or_default();
            if deliveries < max_deliveries {
                continue;
            }

            let deliveries = deliveries.to_string();
            let _: String = conn
                .xadd(
                    &dead_stream,
                    "*",
                    &[
                        (PAYLOAD_FIELD, entry.payload.as_str()),
                        ("sourceId", entry.id.as_str()),
                        ("deliveries", deliveries.as_str()),
                    ],
                )
                .await?;

            tracing::warn!(
                stream = %self.stream,
                entry_id = %entry.id,
                deliveries = %deliveries,
                "Entry moved to dead-letter stream"
            );
            moved.push(entry.id.clone());
        }

        self.ack(&moved).await?;
        Ok(moved.len())
    }
}

/// Appends entries to a stream
#[derive(Clone)]
pub struct StreamPublisher {
    conn: ConnectionManager,
    stream: String,
}

impl StreamPublisher {
    pub fn new(conn: ConnectionManager, stream: &str) -> Self {
        Self {
            conn,
            stream: stream.to_string(),
        }
    }

    /// Appends one payload and returns the new entry id
    pub async fn publish(&self, payload: &str) -> AppResult<String> {
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(&self.stream, "*", &[(PAYLOAD_FIELD, payload)])
            .await?;
        Ok(id)
    }
}

#[async_trait]
impl TriggerSink for StreamPublisher {
    async fn emit(&self, trigger: &RecomputeTrigger) -> AppResult<()> {
        let entry_id = self.publish(trigger.payload()).await?;
        tracing::debug!(
            user_id = %trigger.user_id,
            entry_id = %entry_id,
            stream = %self.stream,
            "Recompute trigger published"
        );
        Ok(())
    }
}
