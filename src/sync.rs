//! Best-effort cloud mirroring of owned contacts, gated on the user's sync
//! preference and current connectivity. Never fatal: a failed upload is
//! surfaced and the contact stays local.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::Contact;
use crate::settings::{Settings, SettingsError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("network error: {reason}")]
    Network { reason: String },

    #[error("backend rejected contact: {reason}")]
    Rejected { reason: String },

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn is_online(&self) -> bool;
}

#[async_trait]
pub trait ContactsBackend: Send + Sync {
    async fn upload_contact(&self, contact: &Contact) -> Result<(), SyncError>;
    async fn fetch_contacts(&self) -> Result<Vec<Contact>, SyncError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The preference is off; nothing was attempted.
    Disabled,
    /// No connectivity; the upload was skipped, not queued.
    Offline,
    Synced,
}

pub struct ContactSync {
    settings: Arc<Settings>,
    network: Arc<dyn NetworkMonitor>,
    backend: Arc<dyn ContactsBackend>,
}

impl ContactSync {
    #[must_use]
    pub fn new(
        settings: Arc<Settings>,
        network: Arc<dyn NetworkMonitor>,
        backend: Arc<dyn ContactsBackend>,
    ) -> Self {
        Self {
            settings,
            network,
            backend,
        }
    }

    pub async fn sync_contact(&self, contact: &Contact) -> Result<SyncOutcome, SyncError> {
        if !self.settings.sync_with_cloud().await? {
            debug!("sync is disabled");
            return Ok(SyncOutcome::Disabled);
        }

        if !self.network.is_online().await {
            debug!("offline, skipping sync");
            return Ok(SyncOutcome::Offline);
        }

        match self.backend.upload_contact(contact).await {
            Ok(()) => Ok(SyncOutcome::Synced),
            Err(e) => {
                warn!(contact = %contact.id, error = %e, "contact sync failed");
                Err(e)
            }
        }
    }
}
