//! Platform capability seams.
//!
//! Every device facility the alert sequence touches — permissions, siren
//! audio, torch, haptics, GPS, message channels, the address book, key-value
//! storage, media capture — is consumed through a thin trait here. The
//! mobile shells implement these against the real SDKs; tests run against
//! the mocks in [`testing`].

mod address_book;
mod alarm;
mod kv;
mod location;
mod media;
mod messaging;
mod permissions;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use self::address_book::{AddressBook, AddressBookError, DeviceContact};
pub use self::alarm::{AlarmError, FeedbackKind, Haptics, Siren, Torch, VibrationPattern};
pub use self::kv::{validate_key, FileStore, KeyValueStore, KvError, MemoryStore};
pub use self::location::{
    Accuracy, LocationError, LocationProvider, LocationStream, WatchConfig,
};
pub use self::media::{MediaCapture, MediaError, MediaLibrary, MediaUri};
pub use self::messaging::{LinkOpener, MessagingError, SmsComposer};
pub use self::permissions::{
    Capability, PermissionError, PermissionGate, PermissionStatus, Permissions,
};

use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("permission error: {0}")]
    Permission(#[from] PermissionError),

    #[error("alarm error: {0}")]
    Alarm(#[from] AlarmError),

    #[error("location error: {0}")]
    Location(#[from] LocationError),

    #[error("messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("storage error: {0}")]
    Kv(#[from] KvError),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("address book error: {0}")]
    AddressBook(#[from] AddressBookError),
}

/// The full capability set a shell hands to the core at startup.
#[derive(Clone)]
pub struct Capabilities {
    pub permissions: Arc<dyn Permissions>,
    pub siren: Arc<dyn Siren>,
    pub torch: Arc<dyn Torch>,
    pub haptics: Arc<dyn Haptics>,
    pub location: Arc<dyn LocationProvider>,
    pub sms: Arc<dyn SmsComposer>,
    pub links: Arc<dyn LinkOpener>,
    pub address_book: Arc<dyn AddressBook>,
    pub kv: Arc<dyn KeyValueStore>,
    pub media: Arc<dyn MediaCapture>,
    pub media_library: Arc<dyn MediaLibrary>,
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for Capabilities {
    fn default() -> Self {
        testing::mock_capabilities()
    }
}
