//! The alarm side-effect bundle: looped siren, torch strobe, vibration.
//!
//! Startup is fire-and-forget with a hard auto-stop deadline. The siren
//! stopping itself after its duration is a safety property: a bug anywhere
//! else must not leave it playing indefinitely. Teardown is idempotent and
//! reachable from every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::capabilities::{FeedbackKind, Haptics, Siren, Torch, VibrationPattern};
use crate::FLASH_BLINK_INTERVAL;

pub struct EffectController {
    siren: Arc<dyn Siren>,
    torch: Arc<dyn Torch>,
    haptics: Arc<dyn Haptics>,
}

struct EffectInner {
    stopped: AtomicBool,
    cancel: watch::Sender<bool>,
    siren: Arc<dyn Siren>,
    torch: Arc<dyn Torch>,
    haptics: Arc<dyn Haptics>,
}

impl EffectInner {
    /// Release everything exactly once; later calls are no-ops.
    async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.cancel.send(true);

        if let Err(e) = self.siren.stop().await {
            warn!(error = %e, "failed to stop siren");
        }
        if let Err(e) = self.torch.set_enabled(false).await {
            warn!(error = %e, "failed to turn torch off");
        }
        if let Err(e) = self.haptics.cancel_vibration().await {
            warn!(error = %e, "failed to cancel vibration");
        }
    }
}

/// Handle to one running effect bundle.
///
/// Not `Clone`: the owning `AlertSession` is the sole mutator of the
/// bundle's lifecycle. Dropping the handle schedules a best-effort stop.
pub struct EffectHandle {
    inner: Arc<EffectInner>,
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

impl EffectHandle {
    /// Idempotent: safe to call from the auto-stop timer, an explicit
    /// cancel, and teardown in any order.
    pub async fn stop(&self) {
        self.inner.stop().await;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for EffectHandle {
    fn drop(&mut self) {
        if !self.inner.stopped.load(Ordering::SeqCst) {
            let inner = Arc::clone(&self.inner);
            if let Ok(rt) = tokio::runtime::Handle::try_current() {
                rt.spawn(async move { inner.stop().await });
            }
        }
    }
}

impl EffectController {
    #[must_use]
    pub fn new(siren: Arc<dyn Siren>, torch: Arc<dyn Torch>, haptics: Arc<dyn Haptics>) -> Self {
        Self {
            siren,
            torch,
            haptics,
        }
    }

    /// Start the bundle. Each effect is independent: the siren failing to
    /// load must not prevent the strobe or the vibration, so failures are
    /// logged and startup continues.
    pub async fn start(&self, duration: Duration) -> EffectHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let inner = Arc::new(EffectInner {
            stopped: AtomicBool::new(false),
            cancel: cancel_tx,
            siren: Arc::clone(&self.siren),
            torch: Arc::clone(&self.torch),
            haptics: Arc::clone(&self.haptics),
        });

        if let Err(e) = inner.siren.start().await {
            warn!(error = %e, "siren failed to start; strobe and vibration continue");
        }
        if let Err(e) = inner.haptics.vibrate(&VibrationPattern::alarm()).await {
            warn!(error = %e, "vibration failed to start");
        }
        if let Err(e) = inner.haptics.notify(FeedbackKind::Error).await {
            warn!(error = %e, "haptic notification failed");
        }

        // Torch strobe on a single repeating interval; cancellation lands
        // between ticks, never mid-toggle.
        {
            let inner = Arc::clone(&inner);
            let mut cancel = cancel_rx.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(FLASH_BLINK_INTERVAL);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                let mut on = false;
                loop {
                    tokio::select! {
                        _ = cancel.changed() => break,
                        _ = ticker.tick() => {
                            on = !on;
                            if let Err(e) = inner.torch.set_enabled(on).await {
                                warn!(error = %e, "torch toggle failed");
                            }
                        }
                    }
                }
            });
        }

        // Auto-stop deadline.
        {
            let inner = Arc::clone(&inner);
            let mut cancel = cancel_rx;
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.changed() => {}
                    () = tokio::time::sleep(duration) => {
                        debug!("effect duration elapsed, auto-stopping");
                        inner.stop().await;
                    }
                }
            });
        }

        EffectHandle { inner }
    }
}
