//! The alert session: state machine, cancellation, and the SOS sequence
//! itself — countdown, permission gate, effect startup, location fix,
//! message composition, contact fan-out, confirmation.
//!
//! The session is the sole owner and sole mutator of the effect bundle's
//! lifecycle; one teardown routine runs on every exit path (success,
//! cancel, error, timeout, drop).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::capabilities::{
    Accuracy, Capabilities, Capability, LocationError, PermissionError, PermissionGate,
};
use crate::contacts::{ContactError, Selection};
use crate::dispatch::{ChannelKind, DispatchError, DispatchReport, Dispatcher, RetryPolicy};
use crate::effects::{EffectController, EffectHandle};
use crate::message::AlertMessage;
use crate::model::{Contact, SessionId, UnixTimeMs};
use crate::{DEFAULT_COUNTDOWN_SECS, SAFETY_TIMEOUT, SIREN_DURATION, SOS_ALBUM_NAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    CountingDown,
    Dispatching,
    Active,
    Cancelled,
}

impl SessionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CountingDown => "counting_down",
            Self::Dispatching => "dispatching",
            Self::Active => "active",
            Self::Cancelled => "cancelled",
        }
    }

    /// Armed means side effects may be running or about to run.
    #[must_use]
    pub const fn is_armed(self) -> bool {
        matches!(self, Self::CountingDown | Self::Dispatching)
    }

    #[must_use]
    pub fn valid_transitions(self) -> Vec<Self> {
        match self {
            Self::Idle => vec![Self::CountingDown],
            Self::CountingDown => vec![Self::Dispatching, Self::Cancelled],
            // Dispatching -> Idle is the error-abort path: permission or
            // location failure leaves no partial session behind.
            Self::Dispatching => vec![Self::Active, Self::Cancelled, Self::Idle],
            Self::Active => vec![Self::Idle],
            Self::Cancelled => vec![Self::Idle],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn validate_transition(self, to: Self) -> Result<(), TransitionError> {
        if self == to {
            return Err(TransitionError::SameStatus);
        }
        if !self.can_transition_to(to) {
            return Err(TransitionError::InvalidTransition { from: self, to });
        }
        Ok(())
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot transition to the same status")]
    SameStatus,
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub countdown: Duration,
    pub siren_duration: Duration,
    /// Independent of the countdown: forces cancellation if the armed
    /// session has not resolved, so a stuck state cannot keep effects
    /// running forever.
    pub safety_timeout: Duration,
    pub retry_policy: RetryPolicy,
    pub channels: Vec<ChannelKind>,
    pub accuracy: Accuracy,
    /// Best-effort photo into the SOS album before dispatch.
    pub capture_photo: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(u64::from(DEFAULT_COUNTDOWN_SECS)),
            siren_duration: SIREN_DURATION,
            safety_timeout: SAFETY_TIMEOUT,
            retry_policy: RetryPolicy::default(),
            channels: vec![ChannelKind::Sms, ChannelKind::WhatsApp],
            accuracy: Accuracy::High,
            capture_photo: false,
        }
    }
}

impl AlertConfig {
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.channels.is_empty() {
            return Err(SessionError::InvalidConfig(
                "at least one channel is required".into(),
            ));
        }
        if self.safety_timeout <= self.countdown {
            return Err(SessionError::InvalidConfig(
                "safety_timeout must exceed the countdown".into(),
            ));
        }
        self.retry_policy.validate()?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Selection(#[from] ContactError),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error("alert cancelled")]
    Cancelled,

    #[error("alert timed out before resolving")]
    SafetyTimeout,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<DispatchError> for SessionError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Cancelled => Self::Cancelled,
            DispatchError::InvalidPolicy(reason) => Self::InvalidConfig(reason),
        }
    }
}

impl SessionError {
    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self {
            Self::Selection(ContactError::EmptySelection) => {
                "Please select at least one contact first.".into()
            }
            Self::Selection(ContactError::NoPhone { name }) => {
                format!("{name} does not have a phone number.")
            }
            Self::Selection(_) => "Could not read your emergency contacts.".into(),
            Self::Permission(PermissionError::Denied { capability }) => {
                format!("{capability} access is required. Please enable it in Settings.")
            }
            Self::Permission(_) => "Could not verify permissions. Please try again.".into(),
            Self::Location(LocationError::PermissionDenied) => {
                "Location access is required to send your location.".into()
            }
            Self::Location(_) => "Could not get your location. Please try again.".into(),
            Self::Cancelled => "SOS alert cancelled.".into(),
            Self::SafetyTimeout => "The alert did not go out in time. Please try again.".into(),
            Self::Transition(_) | Self::InvalidConfig(_) => {
                "The app is in an invalid state. Please try again.".into()
            }
        }
    }
}

/// Clonable cancel trigger handed to the UI; one signal reaches every
/// outstanding timer, the dispatcher, and any open location stream.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

#[derive(Debug)]
pub struct AlertSession {
    id: SessionId,
    status: SessionStatus,
    selection: Selection,
    started_at: UnixTimeMs,
    cancel: Arc<watch::Sender<bool>>,
    effects: Option<EffectHandle>,
}

impl AlertSession {
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    #[must_use]
    pub fn started_at(&self) -> UnixTimeMs {
        self.started_at
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel),
        }
    }

    #[must_use]
    pub fn effects_active(&self) -> bool {
        self.effects.as_ref().is_some_and(EffectHandle::is_active)
    }

    fn cancel_rx(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    fn transition(&mut self, to: SessionStatus) -> Result<(), TransitionError> {
        self.status.validate_transition(to)?;
        debug!(session = %self.id, from = %self.status, to = %to, "session transition");
        self.status = to;
        Ok(())
    }

    fn attach_effects(&mut self, handle: EffectHandle) {
        // At most one bundle: a previous handle (there should never be one)
        // is dropped, which schedules its stop.
        self.effects = Some(handle);
    }

    /// The single teardown routine: releases the effect bundle. Idempotent,
    /// invoked from dismissal, cancellation, error abort, and timeout.
    async fn teardown(&mut self) {
        if let Some(effects) = self.effects.take() {
            effects.stop().await;
        }
    }

    pub(crate) async fn force_cancel(&mut self) {
        let _ = self.cancel.send(true);
        self.teardown().await;
        if self.status.can_transition_to(SessionStatus::Cancelled) {
            self.status = SessionStatus::Cancelled;
        }
    }

    async fn abort_to_idle(&mut self) {
        self.teardown().await;
        if let Err(e) = self.transition(SessionStatus::Idle) {
            warn!(session = %self.id, error = %e, "abort could not reset session");
        }
    }

    /// User dismissed the confirmation: back to idle, stopping any effect
    /// that outlasted the dispatch (the siren may still be running).
    pub async fn dismiss(&mut self) -> Result<(), TransitionError> {
        self.transition(SessionStatus::Idle)?;
        self.teardown().await;
        Ok(())
    }

    /// Acknowledge a cancelled session and return to idle.
    pub async fn reset(&mut self) -> Result<(), TransitionError> {
        self.transition(SessionStatus::Idle)?;
        self.teardown().await;
        Ok(())
    }
}

impl Drop for AlertSession {
    fn drop(&mut self) {
        // Unmount path: the cancel signal stops outstanding timers and the
        // dispatcher; dropping the effect handle schedules its stop.
        let _ = self.cancel.send(true);
    }
}

pub struct SosController {
    caps: Capabilities,
    gate: PermissionGate,
    effects: EffectController,
    dispatcher: Dispatcher,
    config: AlertConfig,
}

impl SosController {
    pub fn new(caps: Capabilities, config: AlertConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let gate = PermissionGate::new(Arc::clone(&caps.permissions));
        let effects = EffectController::new(
            Arc::clone(&caps.siren),
            Arc::clone(&caps.torch),
            Arc::clone(&caps.haptics),
        );
        let dispatcher = Dispatcher::new(Arc::clone(&caps.sms), Arc::clone(&caps.links))
            .with_channels(config.channels.clone())
            .with_retry_policy(config.retry_policy.clone());
        Ok(Self {
            caps,
            gate,
            effects,
            dispatcher,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Validate the selection and arm a session. An empty selection is
    /// rejected here, before any siren or flash side effect exists.
    pub fn arm(&self, contacts: Vec<Contact>) -> Result<AlertSession, SessionError> {
        let selection = Selection::new(contacts)?;
        let (tx, _rx) = watch::channel(false);
        let mut session = AlertSession {
            id: SessionId::generate(),
            status: SessionStatus::Idle,
            selection,
            started_at: UnixTimeMs::now(),
            cancel: Arc::new(tx),
            effects: None,
        };
        session.transition(SessionStatus::CountingDown)?;
        info!(
            session = %session.id,
            contacts = session.selection.len(),
            "session armed"
        );
        Ok(session)
    }

    /// Drive the armed session to resolution.
    ///
    /// Countdown, then: permission gate -> effect startup (fire-and-forget
    /// with its own deadline) -> one location fix -> message composed once
    /// -> concurrent fan-out -> `Active`. A cancel signal or the safety
    /// timeout forces `Cancelled` with full teardown; permission/location
    /// failures abort back to `Idle`.
    #[instrument(skip_all, fields(session = %session.id()))]
    pub async fn run(&self, session: &mut AlertSession) -> Result<DispatchReport, SessionError> {
        let mut cancel_rx = session.cancel_rx();
        if *cancel_rx.borrow() {
            session.force_cancel().await;
            return Err(SessionError::Cancelled);
        }

        let safety = tokio::time::sleep(self.config.safety_timeout);
        tokio::pin!(safety);

        let result = {
            let sequence = self.run_sequence(session);
            tokio::pin!(sequence);
            tokio::select! {
                biased;
                res = &mut sequence => res,
                _ = cancel_rx.changed() => Err(SessionError::Cancelled),
                () = &mut safety => Err(SessionError::SafetyTimeout),
            }
        };

        match result {
            Ok(report) => Ok(report),
            Err(e @ (SessionError::Cancelled | SessionError::SafetyTimeout)) => {
                warn!(session = %session.id(), reason = %e, "alert did not resolve");
                session.force_cancel().await;
                Err(e)
            }
            Err(e) => {
                warn!(session = %session.id(), error = %e, "alert aborted");
                session.abort_to_idle().await;
                Err(e)
            }
        }
    }

    async fn run_sequence(
        &self,
        session: &mut AlertSession,
    ) -> Result<DispatchReport, SessionError> {
        debug!(countdown_ms = self.config.countdown.as_millis() as u64, "countdown started");
        tokio::time::sleep(self.config.countdown).await;
        session.transition(SessionStatus::Dispatching)?;

        // Gate before anything audible happens.
        self.gate.ensure(&[Capability::Location]).await?;

        let handle = self.effects.start(self.config.siren_duration).await;
        session.attach_effects(handle);

        if self.config.capture_photo {
            self.capture_evidence().await;
        }

        let fix = self.caps.location.current_fix(self.config.accuracy).await?;
        let message = AlertMessage::compose(&fix);

        let report = self
            .dispatcher
            .dispatch(session.selection(), &message, session.cancel_rx())
            .await?;

        session.transition(SessionStatus::Active)?;
        info!(
            reached = report.reached_count(),
            total = report.len(),
            "alert active"
        );
        Ok(report)
    }

    /// Evidence capture never blocks the alert: any failure here is logged
    /// and the sequence continues.
    async fn capture_evidence(&self) {
        if let Err(e) = self
            .gate
            .ensure(&[Capability::Camera, Capability::MediaLibrary])
            .await
        {
            warn!(error = %e, "skipping evidence capture");
            return;
        }
        match self.caps.media.capture_photo().await {
            Err(e) => warn!(error = %e, "evidence capture failed"),
            Ok(uri) => {
                if let Err(e) = self
                    .caps
                    .media_library
                    .save_to_album(&uri, SOS_ALBUM_NAME)
                    .await
                {
                    warn!(error = %e, "failed to save capture to album");
                }
            }
        }
    }
}
