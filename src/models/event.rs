use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// One user interaction's effect on taste scores
///
/// Producers (view, subscribe, unsubscribe and review handlers) resolve the
/// user id from the caller identity before enqueueing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceChangeEvent {
    pub user_id: String,
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub directors: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    /// Contribution to the recompute counter
    #[serde(default)]
    pub update_weight: f64,
    /// Signed contribution to every listed category key
    #[serde(default)]
    pub change_weight: f64,
}

impl PreferenceChangeEvent {
    /// Parses a JSON stream payload
    pub fn from_json(payload: &str) -> AppResult<Self> {
        let event: Self = serde_json::from_str(payload)
            .map_err(|e| AppError::MalformedEvent(format!("invalid preference event: {}", e)))?;

        if event.user_id.trim().is_empty() {
            return Err(AppError::MalformedEvent(
                "preference event has an empty userId".to_string(),
            ));
        }

        Ok(event)
    }
}

/// Request to regenerate one user's feed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeTrigger {
    pub user_id: String,
}

impl RecomputeTrigger {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// Parses a trigger payload, which is the bare user id
    pub fn from_payload(payload: &str) -> AppResult<Self> {
        let user_id = payload.trim();
        if user_id.is_empty() {
            return Err(AppError::MalformedEvent(
                "recompute trigger has an empty user id".to_string(),
            ));
        }
        Ok(Self::new(user_id))
    }

    pub fn payload(&self) -> &str {
        &self.user_id
    }
}
