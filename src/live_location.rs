//! Continuous location sharing: a bounded-rate subscription whose lifetime
//! is tied to the owning screen. Stopping is explicit, and dropping the
//! share closes the platform watcher either way.

use tracing::info;
use url::Url;

use crate::capabilities::{LocationError, LocationProvider, LocationStream, WatchConfig};
use crate::message::map_url;
use crate::model::LocationFix;

pub struct LiveLocationShare {
    stream: LocationStream,
    latest: Option<LocationFix>,
}

impl LiveLocationShare {
    pub async fn start(
        provider: &dyn LocationProvider,
        config: WatchConfig,
    ) -> Result<Self, LocationError> {
        let config = config.validated();
        let stream = provider.watch(config).await?;
        info!(
            time_interval_ms = config.time_interval.as_millis() as u64,
            distance_m = config.distance_interval_m,
            "live location sharing started"
        );
        Ok(Self {
            stream,
            latest: None,
        })
    }

    /// Wait for the next fix; `None` once the subscription has ended.
    pub async fn next_update(&mut self) -> Option<LocationFix> {
        let fix = self.stream.next_fix().await?;
        self.latest = Some(fix);
        Some(fix)
    }

    #[must_use]
    pub fn latest(&self) -> Option<&LocationFix> {
        self.latest.as_ref()
    }

    /// Map link for the most recent fix.
    #[must_use]
    pub fn share_url(&self) -> Option<Url> {
        self.latest.as_ref().map(map_url)
    }

    pub fn stop(&mut self) {
        self.stream.close();
        info!("live location sharing stopped");
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stream.is_closed()
    }
}
