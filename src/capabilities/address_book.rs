use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressBookError {
    #[error("contacts permission denied")]
    PermissionDenied,

    #[error("address book query failed: {reason}")]
    QueryFailed { reason: String },
}

/// Raw device address-book record: name plus first phone number, exactly as
/// the platform reports it. Validation happens at import time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceContact {
    pub external_id: String,
    pub name: String,
    pub phone: Option<String>,
}

/// Read-only view of the OS contact book; there is no write-back.
#[async_trait]
pub trait AddressBook: Send + Sync {
    async fn list_contacts(&self) -> Result<Vec<DeviceContact>, AddressBookError>;
}
