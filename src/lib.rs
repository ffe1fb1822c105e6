#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod capabilities;
pub mod contacts;
pub mod dispatch;
pub mod effects;
pub mod live_location;
pub mod message;
pub mod model;
pub mod session;
pub mod settings;
pub mod sync;

use std::time::Duration;

pub use capabilities::{Capabilities, CapabilityError};
pub use dispatch::{ChannelKind, DispatchReport, Dispatcher, RetryPolicy};
pub use effects::{EffectController, EffectHandle};
pub use model::{Contact, ContactId, Coordinate, LocationFix, PhoneNumber, UnixTimeMs};
pub use session::{AlertConfig, AlertSession, SessionError, SessionStatus, SosController};

/// How long the siren plays before it stops itself.
pub const SIREN_DURATION: Duration = Duration::from_secs(10);
/// Torch strobe toggle rate.
pub const FLASH_BLINK_INTERVAL: Duration = Duration::from_millis(300);
/// Countdown before the alert fires, unless the user configured another.
pub const DEFAULT_COUNTDOWN_SECS: u32 = 3;
/// An armed session that has not resolved by this deadline is force-cancelled.
pub const SAFETY_TIMEOUT: Duration = Duration::from_secs(20);

pub const MAX_RETRY_ATTEMPTS: u32 = 3;
pub const BASE_RETRY_DELAY: Duration = Duration::from_millis(1_000);
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);
pub const RETRY_JITTER_MAX_MS: u64 = 250;

pub const RECENT_CONTACTS_CAP: usize = 5;
pub const MIN_PHONE_DIGITS: usize = 5;

pub const CONTACTS_STORAGE_KEY: &str = "@emergency_contacts";
pub const PROFILE_STORAGE_KEY: &str = "@user_credentials";
pub const SYNC_SETTING_KEY: &str = "syncWithCloud";
pub const COUNTDOWN_SETTING_KEY: &str = "countdownSeconds";

pub const SOS_ALBUM_NAME: &str = "SOS Videos";
pub const MAX_CLIP_DURATION: Duration = Duration::from_secs(10);

pub const LIVE_TIME_INTERVAL: Duration = Duration::from_secs(5);
pub const LIVE_DISTANCE_INTERVAL_M: f64 = 5.0;

#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
