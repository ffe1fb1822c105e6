//! Persisted in-app toggles and the user profile, each under its own fixed
//! storage key.

use std::sync::Arc;

use thiserror::Error;

use crate::capabilities::{KeyValueStore, KvError};
use crate::model::UserProfile;
use crate::{COUNTDOWN_SETTING_KEY, DEFAULT_COUNTDOWN_SECS, PROFILE_STORAGE_KEY, SYNC_SETTING_KEY};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("storage failure: {0}")]
    Storage(#[from] KvError),

    #[error("stored setting is corrupted: {reason}")]
    Corrupted { reason: String },
}

pub struct Settings {
    kv: Arc<dyn KeyValueStore>,
}

impl Settings {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Whether owned contacts should be mirrored to the backend. Defaults
    /// to off; stored as the literal strings "true"/"false".
    pub async fn sync_with_cloud(&self) -> Result<bool, SettingsError> {
        Ok(self
            .kv
            .get(SYNC_SETTING_KEY)
            .await?
            .is_some_and(|bytes| bytes == b"true"))
    }

    pub async fn set_sync_with_cloud(&self, enabled: bool) -> Result<(), SettingsError> {
        let value: &[u8] = if enabled { b"true" } else { b"false" };
        self.kv.set(SYNC_SETTING_KEY, value).await?;
        Ok(())
    }

    pub async fn countdown_seconds(&self) -> Result<u32, SettingsError> {
        match self.kv.get(COUNTDOWN_SETTING_KEY).await? {
            None => Ok(DEFAULT_COUNTDOWN_SECS),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| SettingsError::Corrupted {
                reason: e.to_string(),
            }),
        }
    }

    pub async fn set_countdown_seconds(&self, seconds: u32) -> Result<(), SettingsError> {
        let bytes = seconds.to_string().into_bytes();
        self.kv.set(COUNTDOWN_SETTING_KEY, &bytes).await?;
        Ok(())
    }

    pub async fn profile(&self) -> Result<Option<UserProfile>, SettingsError> {
        match self.kv.get(PROFILE_STORAGE_KEY).await? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| SettingsError::Corrupted {
                    reason: e.to_string(),
                }),
        }
    }

    /// Merge-on-save: fields present in `update` replace the stored ones,
    /// everything else is preserved.
    pub async fn save_profile(&self, update: UserProfile) -> Result<UserProfile, SettingsError> {
        let mut profile = self.profile().await?.unwrap_or_default();
        profile.merge(update);

        let bytes = serde_json::to_vec(&profile).map_err(|e| SettingsError::Corrupted {
            reason: e.to_string(),
        })?;
        self.kv.set(PROFILE_STORAGE_KEY, &bytes).await?;
        Ok(profile)
    }

    pub async fn clear_profile(&self) -> Result<(), SettingsError> {
        self.kv.remove(PROFILE_STORAGE_KEY).await?;
        Ok(())
    }
}
