//! End-to-end alert scenarios against mock capabilities, on virtual time.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;

use sos_core::capabilities::testing::{
    MockAddressBook, MockHaptics, MockLinkOpener, MockLocation, MockMediaCapture,
    MockMediaLibrary, MockPermissions, MockSiren, MockSms, MockTorch,
};
use sos_core::capabilities::{
    Capabilities, Capability, LocationError, MemoryStore, PermissionError, PermissionStatus,
};
use sos_core::contacts::ContactError;
use sos_core::dispatch::{ChannelKind, DeliveryFailure, DeliveryResult, RetryPolicy};
use sos_core::model::{Contact, PhoneNumber};
use sos_core::session::{AlertConfig, SessionError, SessionStatus, SosController};

struct Rig {
    permissions: Arc<MockPermissions>,
    siren: Arc<MockSiren>,
    torch: Arc<MockTorch>,
    haptics: Arc<MockHaptics>,
    location: Arc<MockLocation>,
    sms: Arc<MockSms>,
    links: Arc<MockLinkOpener>,
    media: Arc<MockMediaCapture>,
    media_library: Arc<MockMediaLibrary>,
    controller: SosController,
}

fn rig_with(config: AlertConfig, link_schemes: &[&str]) -> Rig {
    let permissions = Arc::new(MockPermissions::new());
    let siren = Arc::new(MockSiren::new());
    let torch = Arc::new(MockTorch::new());
    let haptics = Arc::new(MockHaptics::new());
    let location = Arc::new(MockLocation::with_fix(37.7749, -122.4194));
    let sms = Arc::new(MockSms::new());
    let links = Arc::new(MockLinkOpener::supporting(link_schemes));
    let media = Arc::new(MockMediaCapture::new());
    let media_library = Arc::new(MockMediaLibrary::new());

    let caps = Capabilities {
        permissions: permissions.clone(),
        siren: siren.clone(),
        torch: torch.clone(),
        haptics: haptics.clone(),
        location: location.clone(),
        sms: sms.clone(),
        links: links.clone(),
        address_book: Arc::new(MockAddressBook::new(Vec::new())),
        kv: Arc::new(MemoryStore::new()),
        media: media.clone(),
        media_library: media_library.clone(),
    };

    let controller = SosController::new(caps, config).expect("valid config");
    Rig {
        permissions,
        siren,
        torch,
        haptics,
        location,
        sms,
        links,
        media,
        media_library,
        controller,
    }
}

fn contacts(n: usize) -> Vec<Contact> {
    (0..n)
        .map(|i| {
            Contact::new(
                format!("Contact {i}"),
                PhoneNumber::new(format!("5550100{i:03}")).unwrap(),
            )
            .unwrap()
        })
        .collect()
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn full_flow_sms_sent_whatsapp_unavailable() {
    // Countdown 3 s, two valid contacts, SMS available, WhatsApp not.
    let config = AlertConfig {
        countdown: Duration::from_secs(3),
        ..AlertConfig::default()
    };
    let rig = rig_with(config, &[]);

    let mut session = rig.controller.arm(contacts(2)).unwrap();
    assert_eq!(session.status(), SessionStatus::CountingDown);

    let report = rig.controller.run(&mut session).await.unwrap();

    assert_eq!(session.status(), SessionStatus::Active);
    assert_eq!(report.len(), 2);
    for outcome in &report.outcomes {
        assert_matches!(
            outcome.result_for(ChannelKind::Sms),
            Some(DeliveryResult::Sent)
        );
        assert_matches!(
            outcome.result_for(ChannelKind::WhatsApp),
            Some(DeliveryResult::Failed(DeliveryFailure::ChannelUnavailable))
        );
    }

    // The fix was resolved once and reused for both contacts.
    assert_eq!(rig.location.fix_call_count(), 1);
    let sent = rig.sms.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].1, sent[1].1);
    assert!(sent[0].1.contains("https://maps.google.com/?q=37.7749,-122.4194"));

    // Effects are still running after dispatch completes.
    assert!(session.effects_active());
    assert!(rig.siren.is_playing());
    assert_eq!(rig.haptics.vibration_count(), 1);

    // Dismissing the confirmation stops the outlasting siren.
    session.dismiss().await.unwrap();
    assert_eq!(session.status(), SessionStatus::Idle);
    assert!(!rig.siren.is_playing());
    assert!(!rig.torch.is_on());
}

#[tokio::test(start_paused = true)]
async fn siren_auto_stops_even_without_dismissal() {
    let config = AlertConfig {
        countdown: Duration::from_secs(1),
        siren_duration: Duration::from_secs(10),
        ..AlertConfig::default()
    };
    let rig = rig_with(config, &[]);

    let mut session = rig.controller.arm(contacts(1)).unwrap();
    rig.controller.run(&mut session).await.unwrap();
    assert!(rig.siren.is_playing());

    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;

    assert!(!rig.siren.is_playing());
    assert!(!session.effects_active());
    // The session itself is still active until the user dismisses it.
    assert_eq!(session.status(), SessionStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn empty_selection_rejected_before_any_effect() {
    let rig = rig_with(AlertConfig::default(), &[]);

    let err = rig.controller.arm(Vec::new()).unwrap_err();
    assert_matches!(err, SessionError::Selection(ContactError::EmptySelection));
    assert_eq!(
        err.user_facing_message(),
        "Please select at least one contact first."
    );

    assert_eq!(rig.siren.start_count(), 0);
    assert_eq!(rig.torch.toggle_count(), 0);
    assert_eq!(rig.haptics.vibration_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_countdown_never_reaches_dispatch() {
    let config = AlertConfig {
        countdown: Duration::from_secs(3),
        ..AlertConfig::default()
    };
    let rig = rig_with(config, &[]);

    let mut session = rig.controller.arm(contacts(2)).unwrap();
    let cancel = session.cancel_handle();

    let canceller = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    };
    let (result, ()) = tokio::join!(rig.controller.run(&mut session), canceller);

    assert_matches!(result, Err(SessionError::Cancelled));
    assert_eq!(session.status(), SessionStatus::Cancelled);

    // Dispatching was never entered: no sends, no effects.
    assert_eq!(rig.sms.sent_count(), 0);
    assert_eq!(rig.siren.start_count(), 0);
    assert_eq!(rig.location.fix_call_count(), 0);

    session.reset().await.unwrap();
    assert_eq!(session.status(), SessionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn cancel_before_run_is_honored() {
    let rig = rig_with(AlertConfig::default(), &[]);

    let mut session = rig.controller.arm(contacts(1)).unwrap();
    session.cancel_handle().cancel();

    let result = rig.controller.run(&mut session).await;
    assert_matches!(result, Err(SessionError::Cancelled));
    assert_eq!(session.status(), SessionStatus::Cancelled);
    assert_eq!(rig.siren.start_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn gate_denial_aborts_with_no_side_effects() {
    let rig = rig_with(AlertConfig::default(), &[]);
    rig.permissions
        .set_status(Capability::Location, PermissionStatus::DeniedPermanently);

    let mut session = rig.controller.arm(contacts(2)).unwrap();
    let err = rig.controller.run(&mut session).await.unwrap_err();

    assert_matches!(
        err,
        SessionError::Permission(PermissionError::Denied {
            capability: Capability::Location
        })
    );
    // No partial session lingers: no effects were started, no message sent.
    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(rig.siren.start_count(), 0);
    assert_eq!(rig.sms.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn provider_permission_denial_tears_down_started_effects() {
    let siren = Arc::new(MockSiren::new());
    let torch = Arc::new(MockTorch::new());
    let location = Arc::new(MockLocation::failing(LocationError::PermissionDenied));
    let sms = Arc::new(MockSms::new());

    let caps = Capabilities {
        permissions: Arc::new(MockPermissions::new()),
        siren: siren.clone(),
        torch: torch.clone(),
        haptics: Arc::new(MockHaptics::new()),
        location: location.clone(),
        sms: sms.clone(),
        links: Arc::new(MockLinkOpener::supporting(&[])),
        address_book: Arc::new(MockAddressBook::new(Vec::new())),
        kv: Arc::new(MemoryStore::new()),
        media: Arc::new(MockMediaCapture::new()),
        media_library: Arc::new(MockMediaLibrary::new()),
    };
    let controller = SosController::new(caps, AlertConfig::default()).unwrap();

    let mut session = controller.arm(contacts(1)).unwrap();
    let err = controller.run(&mut session).await.unwrap_err();

    assert_matches!(err, SessionError::Location(LocationError::PermissionDenied));
    assert_eq!(session.status(), SessionStatus::Idle);

    // Effects had already fired, and the abort tore every one down.
    assert_eq!(siren.start_count(), 1);
    assert!(!siren.is_playing());
    assert!(!torch.is_on());
    assert_eq!(sms.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn safety_timeout_forces_cancellation() {
    // Every send fails and the generous retry policy would keep the
    // dispatch in flight far past the deadline.
    let config = AlertConfig {
        countdown: Duration::from_secs(1),
        safety_timeout: Duration::from_secs(5),
        retry_policy: RetryPolicy {
            max_attempts: 50,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2,
        },
        ..AlertConfig::default()
    };
    let rig = rig_with(config, &[]);
    rig.sms.fail_next_sends(u32::MAX);

    let mut session = rig.controller.arm(contacts(1)).unwrap();
    let result = rig.controller.run(&mut session).await;

    assert_matches!(result, Err(SessionError::SafetyTimeout));
    assert_eq!(session.status(), SessionStatus::Cancelled);
    assert!(!rig.siren.is_playing());
    assert!(!session.effects_active());
}

#[tokio::test(start_paused = true)]
async fn evidence_capture_failure_never_blocks_the_alert() {
    let config = AlertConfig {
        capture_photo: true,
        ..AlertConfig::default()
    };
    let rig = rig_with(config, &[]);
    rig.media.fail_captures();

    let mut session = rig.controller.arm(contacts(1)).unwrap();
    let report = rig.controller.run(&mut session).await.unwrap();

    assert_eq!(session.status(), SessionStatus::Active);
    assert_eq!(report.reached_count(), 1);
    assert!(rig.media_library.saved().is_empty());
}

#[tokio::test(start_paused = true)]
async fn evidence_capture_lands_in_the_sos_album() {
    let config = AlertConfig {
        capture_photo: true,
        ..AlertConfig::default()
    };
    let rig = rig_with(config, &[]);

    let mut session = rig.controller.arm(contacts(1)).unwrap();
    rig.controller.run(&mut session).await.unwrap();

    let saved = rig.media_library.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, "SOS Videos");
}

#[tokio::test(start_paused = true)]
async fn whatsapp_only_device_still_reaches_contacts() {
    // SMS composer missing and no sms: handler; whatsapp carries the alert.
    let rig = rig_with(AlertConfig::default(), &["whatsapp"]);
    rig.sms.set_available(false);

    let mut session = rig.controller.arm(contacts(2)).unwrap();
    let report = rig.controller.run(&mut session).await.unwrap();

    assert_eq!(report.reached_count(), 2);
    for outcome in &report.outcomes {
        assert_matches!(
            outcome.result_for(ChannelKind::Sms),
            Some(DeliveryResult::Failed(DeliveryFailure::ChannelUnavailable))
        );
        assert_matches!(
            outcome.result_for(ChannelKind::WhatsApp),
            Some(DeliveryResult::Sent)
        );
    }
    assert_eq!(rig.links.opened_count("whatsapp"), 2);
}
