//! Periodic scheduling of monitor passes

use crate::monitor::{MonitorConfig, PollingFileMonitorService};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Counters collected while a driver runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub passes: u64,
    pub full_scans: u64,
    pub events_published: u64,
}

/// Runs `scan_notified` on every tick and `scan_all` on every Nth tick.
///
/// The first tick is always a full scan so each request gets its initial snapshot.
pub struct MonitorDriver {
    service: Arc<PollingFileMonitorService>,
    poll_interval: Duration,
    full_scan_every: u64,
}

impl MonitorDriver {
    pub fn new(service: Arc<PollingFileMonitorService>, config: &MonitorConfig) -> Self {
        Self {
            service,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            full_scan_every: u64::from(config.full_scan_every.max(1)),
        }
    }

    /// Poll until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> DriverStats
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            "Polling every {:?}, full scan every {} passes",
            self.poll_interval, self.full_scan_every
        );

        let mut stats = DriverStats::default();
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    let full = stats.passes % self.full_scan_every == 0;
                    let service = self.service.clone();
                    let pass = tokio::task::spawn_blocking(move || {
                        if full { service.scan_all() } else { service.scan_notified() }
                    });
                    match pass.await {
                        Ok(published) => {
                            stats.events_published += published as u64;
                            if full {
                                stats.full_scans += 1;
                            }
                            debug!("Pass {} published {} events", stats.passes, published);
                        }
                        Err(e) => warn!("Monitor pass failed: {}", e),
                    }
                    stats.passes += 1;
                }
            }
        }

        info!("Monitor driver stopped after {} passes", stats.passes);
        stats
    }
}
