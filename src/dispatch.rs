//! Contact fan-out: the same alert message delivered to every selected
//! contact over the configured channels.
//!
//! Contacts are dispatched concurrently and joined before the report is
//! returned. Failures are collected per contact and per channel, never
//! propagated as an aborting error: one bad number must not keep the next
//! contact from being alerted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::capabilities::{LinkOpener, MessagingError, SmsComposer};
use crate::contacts::Selection;
use crate::message::{mailto_url, sms_url, wa_me_url, whatsapp_url, AlertMessage};
use crate::model::{Contact, ContactId};
use crate::{BASE_RETRY_DELAY, MAX_RETRY_ATTEMPTS, MAX_RETRY_DELAY, RETRY_JITTER_MAX_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Sms,
    WhatsApp,
    Email,
}

impl ChannelKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::WhatsApp => "whatsapp",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform retry policy for every channel attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRY_ATTEMPTS,
            base_delay: BASE_RETRY_DELAY,
            backoff_multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff_multiplier: 1,
        }
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.max_attempts == 0 {
            return Err(DispatchError::InvalidPolicy(
                "max_attempts must be > 0".into(),
            ));
        }
        if self.backoff_multiplier == 0 {
            return Err(DispatchError::InvalidPolicy(
                "backoff_multiplier must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Delay before the next attempt, given how many have failed so far.
    #[must_use]
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        let factor = u64::from(self.backoff_multiplier).saturating_pow(exponent);
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let capped = base_ms
            .saturating_mul(factor)
            .min(u64::try_from(MAX_RETRY_DELAY.as_millis()).unwrap_or(u64::MAX));
        let jitter = rand::thread_rng().gen_range(0..=RETRY_JITTER_MAX_MS);
        Duration::from_millis(capped.saturating_add(jitter))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryFailure {
    #[error("channel unavailable")]
    ChannelUnavailable,

    #[error("invalid recipient: {reason}")]
    InvalidRecipient { reason: String },

    #[error("send failed after {attempts} attempt(s): {reason}")]
    SendFailed { attempts: u32, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Sent,
    Failed(DeliveryFailure),
}

impl DeliveryResult {
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOutcome {
    pub channel: ChannelKind,
    pub result: DeliveryResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactOutcome {
    pub contact_id: ContactId,
    pub name: String,
    pub channels: Vec<ChannelOutcome>,
}

impl ContactOutcome {
    #[must_use]
    pub fn result_for(&self, channel: ChannelKind) -> Option<&DeliveryResult> {
        self.channels
            .iter()
            .find(|c| c.channel == channel)
            .map(|c| &c.result)
    }

    /// At least one channel got the message out.
    #[must_use]
    pub fn any_sent(&self) -> bool {
        self.channels.iter().any(|c| c.result.is_sent())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub outcomes: Vec<ContactOutcome>,
}

impl DispatchReport {
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    #[must_use]
    pub fn reached_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.any_sent()).count()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatch cancelled")]
    Cancelled,

    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),
}

pub struct Dispatcher {
    sms: Arc<dyn SmsComposer>,
    links: Arc<dyn LinkOpener>,
    channels: Vec<ChannelKind>,
    policy: RetryPolicy,
}

impl Dispatcher {
    #[must_use]
    pub fn new(sms: Arc<dyn SmsComposer>, links: Arc<dyn LinkOpener>) -> Self {
        Self {
            sms,
            links,
            channels: vec![ChannelKind::Sms, ChannelKind::WhatsApp],
            policy: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_channels(mut self, channels: Vec<ChannelKind>) -> Self {
        self.channels = channels;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fan the message out to every contact in the selection.
    ///
    /// Returns exactly one outcome per contact for any selection of size
    /// N >= 1, regardless of individual failures. On cancellation the
    /// remaining work is abandoned: already-sent messages stay sent, no
    /// further contacts are processed, and the partial results are
    /// discarded.
    #[instrument(skip_all, fields(contacts = selection.len()))]
    pub async fn dispatch(
        &self,
        selection: &Selection,
        message: &AlertMessage,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<DispatchReport, DispatchError> {
        self.policy.validate()?;

        if *cancel.borrow() {
            return Err(DispatchError::Cancelled);
        }

        let contacts = selection.contacts();
        let mut join_set = JoinSet::new();
        for (index, contact) in contacts.iter().cloned().enumerate() {
            let sms = Arc::clone(&self.sms);
            let links = Arc::clone(&self.links);
            let channels = self.channels.clone();
            let policy = self.policy.clone();
            let body = message.body().to_string();
            join_set.spawn(async move {
                let outcome = send_to_contact(&*sms, &*links, &channels, &policy, &contact, &body)
                    .await;
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<ContactOutcome>> = vec![None; contacts.len()];
        let mut cancel_live = true;
        loop {
            tokio::select! {
                changed = cancel.changed(), if cancel_live => {
                    match changed {
                        Ok(()) if *cancel.borrow() => {
                            warn!("dispatch cancelled, abandoning remaining contacts");
                            join_set.abort_all();
                            return Err(DispatchError::Cancelled);
                        }
                        Ok(()) => {}
                        Err(_) => cancel_live = false,
                    }
                }
                joined = join_set.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok((index, outcome))) => slots[index] = Some(outcome),
                        Some(Err(e)) if e.is_cancelled() => {}
                        Some(Err(e)) => warn!(error = %e, "contact send task failed"),
                    }
                }
            }
        }

        // A crashed task still yields a per-contact failure; the report
        // always has one entry per contact.
        let outcomes = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| ContactOutcome {
                    contact_id: contacts[index].id.clone(),
                    name: contacts[index].name.clone(),
                    channels: self
                        .channels
                        .iter()
                        .map(|&channel| ChannelOutcome {
                            channel,
                            result: DeliveryResult::Failed(DeliveryFailure::SendFailed {
                                attempts: 0,
                                reason: "send task failed".into(),
                            }),
                        })
                        .collect(),
                })
            })
            .collect();

        let report = DispatchReport { outcomes };
        info!(
            reached = report.reached_count(),
            total = report.len(),
            "dispatch complete"
        );
        Ok(report)
    }
}

async fn send_to_contact(
    sms: &dyn SmsComposer,
    links: &dyn LinkOpener,
    channels: &[ChannelKind],
    policy: &RetryPolicy,
    contact: &Contact,
    body: &str,
) -> ContactOutcome {
    let mut outcomes = Vec::with_capacity(channels.len());
    for &channel in channels {
        let result = attempt_channel(sms, links, channel, contact, body, policy).await;
        outcomes.push(ChannelOutcome { channel, result });
    }
    ContactOutcome {
        contact_id: contact.id.clone(),
        name: contact.name.clone(),
        channels: outcomes,
    }
}

/// One channel for one contact, with the retry policy applied. Channels are
/// independent: whatever happens here, the caller moves on to the next one.
async fn attempt_channel(
    sms: &dyn SmsComposer,
    links: &dyn LinkOpener,
    channel: ChannelKind,
    contact: &Contact,
    body: &str,
    policy: &RetryPolicy,
) -> DeliveryResult {
    match channel {
        ChannelKind::Sms | ChannelKind::WhatsApp => {
            if contact.primary_phone().is_none() {
                return DeliveryResult::Failed(DeliveryFailure::InvalidRecipient {
                    reason: "no phone number".into(),
                });
            }
        }
        ChannelKind::Email => {
            if contact.email.is_none() {
                return DeliveryResult::Failed(DeliveryFailure::InvalidRecipient {
                    reason: "no email address".into(),
                });
            }
        }
    }

    let mut failed_attempts = 0;
    loop {
        match try_channel_once(sms, links, channel, contact, body).await {
            Ok(()) => return DeliveryResult::Sent,
            Err(e) if !e.is_retryable() => {
                return DeliveryResult::Failed(match e {
                    MessagingError::SmsUnavailable | MessagingError::LinkUnsupported { .. } => {
                        DeliveryFailure::ChannelUnavailable
                    }
                    MessagingError::SendFailed { reason } => DeliveryFailure::SendFailed {
                        attempts: failed_attempts + 1,
                        reason,
                    },
                });
            }
            Err(e) => {
                failed_attempts += 1;
                if failed_attempts >= policy.max_attempts {
                    return DeliveryResult::Failed(DeliveryFailure::SendFailed {
                        attempts: failed_attempts,
                        reason: e.to_string(),
                    });
                }
                let delay = policy.delay_for(failed_attempts);
                warn!(
                    channel = %channel,
                    contact = %contact.id,
                    attempt = failed_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "channel attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn try_channel_once(
    sms: &dyn SmsComposer,
    links: &dyn LinkOpener,
    channel: ChannelKind,
    contact: &Contact,
    body: &str,
) -> Result<(), MessagingError> {
    match channel {
        ChannelKind::Sms => {
            let Some(phone) = contact.primary_phone() else {
                return Err(MessagingError::SmsUnavailable);
            };
            if sms.is_available().await {
                sms.send(phone, body).await
            } else {
                // No composer on this device: fall back to the sms: link.
                let url = sms_url(phone, body);
                if links.can_open(&url).await {
                    links.open(&url).await
                } else {
                    Err(MessagingError::SmsUnavailable)
                }
            }
        }
        ChannelKind::WhatsApp => {
            let Some(phone) = contact.primary_phone() else {
                return Err(MessagingError::LinkUnsupported {
                    url: "whatsapp://send".into(),
                });
            };
            let url = whatsapp_url(phone, body);
            if links.can_open(&url).await {
                links.open(&url).await
            } else {
                let fallback = wa_me_url(phone, body);
                if links.can_open(&fallback).await {
                    links.open(&fallback).await
                } else {
                    Err(MessagingError::LinkUnsupported {
                        url: url.to_string(),
                    })
                }
            }
        }
        ChannelKind::Email => {
            let Some(email) = contact.email.as_deref() else {
                return Err(MessagingError::LinkUnsupported {
                    url: "mailto:".into(),
                });
            };
            let url = mailto_url(email, body).map_err(|e| MessagingError::LinkUnsupported {
                url: format!("mailto:{email} ({e})"),
            })?;
            if links.can_open(&url).await {
                links.open(&url).await
            } else {
                Err(MessagingError::LinkUnsupported {
                    url: url.to_string(),
                })
            }
        }
    }
}
