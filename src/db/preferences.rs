use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::keys::{parse_score_field, score_field, StoreKey, COUNTER_FIELD};
use super::PreferenceStore;
use crate::api::Probe;
use crate::error::{AppError, AppResult};
use crate::models::{PreferenceDelta, UserPreferenceProfile};

/// Preference profiles stored as one Redis hash per user
///
/// Every score lives in a field of `pref:{user}`; `HINCRBYFLOAT` treats a
/// missing field as zero, so first-seen keys need no separate initialization.
#[derive(Clone)]
pub struct RedisPreferenceStore {
    conn: ConnectionManager,
}

impl RedisPreferenceStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl PreferenceStore for RedisPreferenceStore {
    async fn ensure_initialized(&self, user_id: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let key = StoreKey::Preferences(user_id.to_string()).to_string();

        let created: bool = conn.hset_nx(&key, COUNTER_FIELD, 0).await?;
        if created {
            tracing::debug!(user_id = %user_id, "Created preference profile");
        }

        Ok(())
    }

    async fn increment(&self, user_id: &str, delta: &PreferenceDelta) -> AppResult<f64> {
        let mut conn = self.conn.clone();
        let key = StoreKey::Preferences(user_id.to_string()).to_string();

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (category, name, value) in delta.entries() {
            pipe.hincr(&key, score_field(category, name), value).ignore();
        }
        pipe.hincr(&key, COUNTER_FIELD, delta.update_weight);

        let (counter,): (f64,) = pipe.query_async(&mut conn).await?;
        Ok(counter)
    }

    async fn reset_counter(&self, user_id: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let key = StoreKey::Preferences(user_id.to_string()).to_string();

        let _: () = conn.hset(&key, COUNTER_FIELD, 0).await?;
        Ok(())
    }

    async fn add_to_counter(&self, user_id: &str, amount: f64) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let key = StoreKey::Preferences(user_id.to_string()).to_string();

        let _: f64 = conn.hincr(&key, COUNTER_FIELD, amount).await?;
        Ok(())
    }

    async fn load(&self, user_id: &str) -> AppResult<Option<UserPreferenceProfile>> {
        let mut conn = self.conn.clone();
        let key = StoreKey::Preferences(user_id.to_string()).to_string();

        let fields: HashMap<String, String> = conn.hgetall(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        decode_profile(user_id, fields).map(Some)
    }
}

#[async_trait]
impl Probe for RedisPreferenceStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Rebuilds a profile from the raw fields of its hash
fn decode_profile(
    user_id: &str,
    fields: HashMap<String, String>,
) -> AppResult<UserPreferenceProfile> {
    let mut profile = UserPreferenceProfile::empty(user_id);

    for (field, raw) in fields {
        let value: f64 = raw.parse().map_err(|_| {
            AppError::Internal(format!(
                "non-numeric value {:?} in field {} of profile {}",
                raw, field, user_id
            ))
        })?;

        if field == COUNTER_FIELD {
            profile.update_counter = value;
        } else if let Some((category, name)) = parse_score_field(&field) {
            profile.scores_mut(category).insert(name.to_string(), value);
        } else {
            tracing::warn!(user_id = %user_id, field = %field, "Ignoring unknown profile field");
        }
    }

    Ok(profile)
}
