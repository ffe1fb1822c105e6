//! Mock capability implementations for host-side tests and shell previews.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::model::{Coordinate, LocationFix, PhoneNumber};

use super::{
    Accuracy, AddressBook, AddressBookError, AlarmError, Capabilities, Capability, DeviceContact,
    FeedbackKind, Haptics, LinkOpener, LocationError, LocationProvider, LocationStream, MediaCapture,
    MediaError, MediaLibrary, MediaUri, MemoryStore, MessagingError, PermissionStatus,
    Permissions, Siren, SmsComposer, Torch, VibrationPattern, WatchConfig,
};

#[must_use]
pub fn mock_capabilities() -> Capabilities {
    Capabilities {
        permissions: Arc::new(MockPermissions::new()),
        siren: Arc::new(MockSiren::new()),
        torch: Arc::new(MockTorch::new()),
        haptics: Arc::new(MockHaptics::new()),
        location: Arc::new(MockLocation::with_fix(37.7749, -122.4194)),
        sms: Arc::new(MockSms::new()),
        links: Arc::new(MockLinkOpener::supporting(&[
            "whatsapp", "sms", "mailto", "https",
        ])),
        address_book: Arc::new(MockAddressBook::new(Vec::new())),
        kv: Arc::new(MemoryStore::new()),
        media: Arc::new(MockMediaCapture::new()),
        media_library: Arc::new(MockMediaLibrary::new()),
    }
}

// --- Permissions ---

#[derive(Default)]
pub struct MockPermissions {
    statuses: Mutex<HashMap<Capability, PermissionStatus>>,
    grant_on_request: Mutex<HashSet<Capability>>,
    prompts: Mutex<HashMap<Capability, u32>>,
}

impl MockPermissions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, capability: Capability, status: PermissionStatus) {
        self.statuses.lock().unwrap().insert(capability, status);
    }

    /// The next prompt for `capability` grants it.
    pub fn grant_on_request(&self, capability: Capability) {
        self.grant_on_request.lock().unwrap().insert(capability);
    }

    #[must_use]
    pub fn prompt_count(&self, capability: Capability) -> u32 {
        self.prompts
            .lock()
            .unwrap()
            .get(&capability)
            .copied()
            .unwrap_or(0)
    }

    fn current(&self, capability: Capability) -> PermissionStatus {
        self.statuses
            .lock()
            .unwrap()
            .get(&capability)
            .copied()
            .unwrap_or(PermissionStatus::Granted)
    }
}

#[async_trait]
impl Permissions for MockPermissions {
    async fn check(&self, capability: Capability) -> Result<PermissionStatus, super::PermissionError> {
        Ok(self.current(capability))
    }

    async fn request(
        &self,
        capability: Capability,
    ) -> Result<PermissionStatus, super::PermissionError> {
        *self.prompts.lock().unwrap().entry(capability).or_insert(0) += 1;

        if self.grant_on_request.lock().unwrap().remove(&capability) {
            self.set_status(capability, PermissionStatus::Granted);
        }
        Ok(self.current(capability))
    }
}

// --- Alarm devices ---

#[derive(Default)]
pub struct MockSiren {
    playing: AtomicBool,
    starts: AtomicU32,
    stops: AtomicU32,
    fail_start: AtomicBool,
}

impl MockSiren {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn start_count(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn stop_count(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Siren for MockSiren {
    async fn start(&self) -> Result<(), AlarmError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(AlarmError::SirenLoadFailed {
                reason: "injected load failure".into(),
            });
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), AlarmError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockTorch {
    on: AtomicBool,
    toggles: AtomicU32,
}

impl MockTorch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn toggle_count(&self) -> u32 {
        self.toggles.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Torch for MockTorch {
    async fn set_enabled(&self, on: bool) -> Result<(), AlarmError> {
        self.on.store(on, Ordering::SeqCst);
        self.toggles.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockHaptics {
    vibrations: Mutex<Vec<VibrationPattern>>,
    cancels: AtomicU32,
    notifications: Mutex<Vec<FeedbackKind>>,
}

impl MockHaptics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn vibration_count(&self) -> usize {
        self.vibrations.lock().unwrap().len()
    }

    #[must_use]
    pub fn cancel_count(&self) -> u32 {
        self.cancels.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn notification_count(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }
}

#[async_trait]
impl Haptics for MockHaptics {
    async fn vibrate(&self, pattern: &VibrationPattern) -> Result<(), AlarmError> {
        self.vibrations.lock().unwrap().push(pattern.clone());
        Ok(())
    }

    async fn cancel_vibration(&self) -> Result<(), AlarmError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn notify(&self, kind: FeedbackKind) -> Result<(), AlarmError> {
        self.notifications.lock().unwrap().push(kind);
        Ok(())
    }
}

// --- Location ---

pub struct MockLocation {
    result: Mutex<Result<LocationFix, LocationError>>,
    fix_calls: AtomicU32,
    watch_queue: Mutex<Vec<LocationFix>>,
    watch_open: Arc<AtomicBool>,
}

impl MockLocation {
    /// Always resolves to the given coordinates.
    ///
    /// # Panics
    /// Panics on out-of-range coordinates; this is test-only code.
    #[must_use]
    pub fn with_fix(lat: f64, lon: f64) -> Self {
        let coordinate = Coordinate::new(lat, lon).expect("valid mock coordinate");
        Self {
            result: Mutex::new(Ok(LocationFix::new(coordinate).with_accuracy(5.0))),
            fix_calls: AtomicU32::new(0),
            watch_queue: Mutex::new(Vec::new()),
            watch_open: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn failing(error: LocationError) -> Self {
        Self {
            result: Mutex::new(Err(error)),
            fix_calls: AtomicU32::new(0),
            watch_queue: Mutex::new(Vec::new()),
            watch_open: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn fix_call_count(&self) -> u32 {
        self.fix_calls.load(Ordering::SeqCst)
    }

    /// Queue fixes the next `watch` call will deliver.
    pub fn queue_watch_fix(&self, fix: LocationFix) {
        self.watch_queue.lock().unwrap().push(fix);
    }

    /// Whether a platform watcher is currently held open.
    #[must_use]
    pub fn watch_open(&self) -> bool {
        self.watch_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationProvider for MockLocation {
    async fn current_fix(&self, _accuracy: Accuracy) -> Result<LocationFix, LocationError> {
        self.fix_calls.fetch_add(1, Ordering::SeqCst);
        self.result.lock().unwrap().clone()
    }

    async fn watch(&self, _config: WatchConfig) -> Result<LocationStream, LocationError> {
        if let Err(e) = self.result.lock().unwrap().as_ref() {
            return Err(e.clone());
        }

        let (tx, rx) = mpsc::channel(16);
        let (stream, mut close_rx) = LocationStream::new(rx);

        for fix in self.watch_queue.lock().unwrap().drain(..) {
            let _ = tx.try_send(fix);
        }

        self.watch_open.store(true, Ordering::SeqCst);
        let open = Arc::clone(&self.watch_open);
        tokio::spawn(async move {
            // Keep the "platform watcher" alive until the consumer closes.
            loop {
                if *close_rx.borrow() {
                    break;
                }
                if close_rx.changed().await.is_err() {
                    break;
                }
            }
            open.store(false, Ordering::SeqCst);
            drop(tx);
        });

        Ok(stream)
    }
}

// --- Messaging ---

pub struct MockSms {
    available: AtomicBool,
    fail_next: AtomicU32,
    sent: Mutex<Vec<(String, String)>>,
}

impl Default for MockSms {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSms {
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            fail_next: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make the next `n` sends fail with a retryable error.
    pub fn fail_next_sends(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    #[must_use]
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl SmsComposer for MockSms {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn send(&self, to: &PhoneNumber, body: &str) -> Result<(), MessagingError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(MessagingError::SmsUnavailable);
        }
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(MessagingError::SendFailed {
                reason: "injected send failure".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.as_str().to_string(), body.to_string()));
        Ok(())
    }
}

pub struct MockLinkOpener {
    schemes: Mutex<HashSet<String>>,
    opened: Mutex<Vec<String>>,
    fail_next: AtomicU32,
}

impl MockLinkOpener {
    #[must_use]
    pub fn supporting(schemes: &[&str]) -> Self {
        Self {
            schemes: Mutex::new(schemes.iter().map(|s| (*s).to_string()).collect()),
            opened: Mutex::new(Vec::new()),
            fail_next: AtomicU32::new(0),
        }
    }

    pub fn remove_scheme(&self, scheme: &str) {
        self.schemes.lock().unwrap().remove(scheme);
    }

    pub fn fail_next_opens(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    #[must_use]
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    #[must_use]
    pub fn opened_count(&self, scheme: &str) -> usize {
        let prefix = format!("{scheme}:");
        self.opened
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.starts_with(&prefix))
            .count()
    }
}

#[async_trait]
impl LinkOpener for MockLinkOpener {
    async fn can_open(&self, url: &Url) -> bool {
        self.schemes.lock().unwrap().contains(url.scheme())
    }

    async fn open(&self, url: &Url) -> Result<(), MessagingError> {
        if !self.can_open(url).await {
            return Err(MessagingError::LinkUnsupported {
                url: url.to_string(),
            });
        }
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(MessagingError::SendFailed {
                reason: "injected open failure".into(),
            });
        }
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

// --- Address book ---

pub struct MockAddressBook {
    contacts: Vec<DeviceContact>,
}

impl MockAddressBook {
    #[must_use]
    pub fn new(contacts: Vec<DeviceContact>) -> Self {
        Self { contacts }
    }
}

#[async_trait]
impl AddressBook for MockAddressBook {
    async fn list_contacts(&self) -> Result<Vec<DeviceContact>, AddressBookError> {
        Ok(self.contacts.clone())
    }
}

// --- Media ---

#[derive(Default)]
pub struct MockMediaCapture {
    fail: AtomicBool,
    captures: AtomicU32,
}

impl MockMediaCapture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_captures(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn capture_count(&self) -> u32 {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaCapture for MockMediaCapture {
    async fn capture_photo(&self) -> Result<MediaUri, MediaError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MediaError::CaptureFailed {
                reason: "injected capture failure".into(),
            });
        }
        let n = self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(MediaUri(format!("file:///mock/photo-{n}.jpg")))
    }

    async fn record_clip(&self, _max_duration: Duration) -> Result<MediaUri, MediaError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MediaError::CaptureFailed {
                reason: "injected capture failure".into(),
            });
        }
        let n = self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(MediaUri(format!("file:///mock/clip-{n}.mp4")))
    }
}

#[derive(Default)]
pub struct MockMediaLibrary {
    saved: Mutex<Vec<(String, String)>>,
}

impl MockMediaLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn saved(&self) -> Vec<(String, String)> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaLibrary for MockMediaLibrary {
    async fn save_to_album(&self, uri: &MediaUri, album: &str) -> Result<MediaUri, MediaError> {
        self.saved
            .lock()
            .unwrap()
            .push((album.to_string(), uri.as_str().to_string()));
        Ok(uri.clone())
    }
}
