use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::model::PhoneNumber;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessagingError {
    #[error("sms not supported on this device")]
    SmsUnavailable,

    #[error("no handler for link: {url}")]
    LinkUnsupported { url: String },

    #[error("send failed: {reason}")]
    SendFailed { reason: String },
}

impl MessagingError {
    /// Unavailability is a property of the device, not of the attempt;
    /// retrying it is pointless.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::SendFailed { .. })
    }
}

/// The platform SMS composer.
#[async_trait]
pub trait SmsComposer: Send + Sync {
    async fn is_available(&self) -> bool;
    async fn send(&self, to: &PhoneNumber, body: &str) -> Result<(), MessagingError>;
}

/// Deep-link dispatch (`whatsapp://`, `sms:`, `mailto:`).
#[async_trait]
pub trait LinkOpener: Send + Sync {
    async fn can_open(&self, url: &Url) -> bool;
    async fn open(&self, url: &Url) -> Result<(), MessagingError>;
}
