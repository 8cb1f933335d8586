use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{
    channel::TriggerSink,
    db::PreferenceStore,
    error::AppResult,
    models::{PreferenceChangeEvent, PreferenceDelta, RecomputeTrigger},
    services::RetryPolicy,
};

/// Result of applying one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub events: usize,
    pub users: usize,
    pub triggers: Vec<RecomputeTrigger>,
}

/// Folds preference change events into per-user profiles
///
/// Each user's events in a batch are merged first so the store sees one
/// atomic increment per user. Crossing the recompute threshold resets the
/// counter and emits a trigger for that user.
///
/// Two workers crossing the threshold for the same user at the same time may
/// both emit; feed regeneration tolerates duplicates, so triggers are
/// at-least-once rather than exactly-once.
pub struct PreferenceAggregator {
    store: Arc<dyn PreferenceStore>,
    triggers: Arc<dyn TriggerSink>,
    retry: RetryPolicy,
    threshold: f64,
}

impl PreferenceAggregator {
    pub fn new(
        store: Arc<dyn PreferenceStore>,
        triggers: Arc<dyn TriggerSink>,
        retry: RetryPolicy,
        threshold: f64,
    ) -> Self {
        Self {
            store,
            triggers,
            retry,
            threshold,
        }
    }

    /// Parses every payload; one bad payload rejects the whole batch
    pub fn parse_batch<S: AsRef<str>>(payloads: &[S]) -> AppResult<Vec<PreferenceChangeEvent>> {
        payloads
            .iter()
            .map(|payload| PreferenceChangeEvent::from_json(payload.as_ref()))
            .collect()
    }

    /// Merges events into one delta per user
    pub fn fold_batch(events: &[PreferenceChangeEvent]) -> BTreeMap<String, PreferenceDelta> {
        events.iter().fold(BTreeMap::new(), |mut users, event| {
            users
                .entry(event.user_id.clone())
                .or_insert_with(PreferenceDelta::default)
                .absorb(event);
            users
        })
    }

    #[tracing::instrument(skip_all, fields(batch_size = payloads.len()))]
    pub async fn handle_batch<S: AsRef<str>>(&self, payloads: &[S]) -> AppResult<BatchOutcome> {
        let events = Self::parse_batch(payloads)?;
        let deltas = Self::fold_batch(&events);

        let mut outcome = BatchOutcome {
            events: events.len(),
            users: deltas.len(),
            triggers: Vec::new(),
        };

        for (user_id, delta) in &deltas {
            if let Some(trigger) = self.apply(user_id, delta).await? {
                outcome.triggers.push(trigger);
            }
        }

        tracing::info!(
            events = outcome.events,
            users = outcome.users,
            triggers = outcome.triggers.len(),
            "Preference batch applied"
        );

        Ok(outcome)
    }

    /// Applies one user's merged delta and evaluates the threshold
    async fn apply(
        &self,
        user_id: &str,
        delta: &PreferenceDelta,
    ) -> AppResult<Option<RecomputeTrigger>> {
        let store = self.store.as_ref();

        self.retry
            .run("ensure_initialized", || store.ensure_initialized(user_id))
            .await?;

        let counter = self
            .retry
            .run("increment", || store.increment(user_id, delta))
            .await?;

        tracing::debug!(
            user_id = %user_id,
            keys = delta.key_count(),
            update_weight = delta.update_weight,
            counter,
            "Preferences incremented"
        );

        if counter <= self.threshold {
            return Ok(None);
        }

        self.retry
            .run("reset_counter", || store.reset_counter(user_id))
            .await?;

        let trigger = RecomputeTrigger::new(user_id);
        if let Err(e) = self.triggers.emit(&trigger).await {
            // Put the counter back so redelivery crosses the threshold again
            let restored = self
                .retry
                .run("restore_counter", || store.add_to_counter(user_id, counter))
                .await;
            if let Err(restore_err) = restored {
                tracing::error!(
                    user_id = %user_id,
                    counter,
                    error = %restore_err,
                    "Counter restore failed after trigger emit failure"
                );
            }
            return Err(e);
        }

        tracing::info!(
            user_id = %user_id,
            counter,
            threshold = self.threshold,
            "Recompute threshold crossed, trigger emitted"
        );

        Ok(Some(trigger))
    }
}
