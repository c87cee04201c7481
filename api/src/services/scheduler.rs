use std::time::Duration;

use domain::RefreshJob;
use job_queue::RefreshQueue;
use metrics::counter;
use tokio::{
    sync::watch,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{info, warn};

use super::asset_store::AssetStore;

/// Periodically enqueues one [`RefreshJob`] per tracked asset.
///
/// Holds no per-asset state, so a second instance only produces duplicate
/// jobs, which the worker handles idempotently.
#[derive(Clone)]
pub struct RefreshScheduler {
    store: AssetStore,
    queue: RefreshQueue,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(store: AssetStore, queue: RefreshQueue, interval: Duration) -> Self {
        Self {
            store,
            queue,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One sweep: discover assets and push a job for each. Returns how many
    /// jobs were enqueued; discovery and push failures are logged only.
    pub async fn fire(&self) -> usize {
        let assets = match self.store.discover_tracked_assets().await {
            Ok(assets) => assets,
            Err(err) => {
                warn!(error = %err, "asset discovery failed, skipping sweep");
                counter!("pnl_refresh_sweeps_total", "status" => "error").increment(1);
                return 0;
            }
        };

        let mut enqueued = 0;
        for asset_id in &assets {
            match self.queue.push(&RefreshJob::new(asset_id.as_str())).await {
                Ok(()) => enqueued += 1,
                Err(err) => {
                    warn!(error = %err, asset_id = %asset_id, "failed to enqueue refresh job");
                    counter!("pnl_refresh_enqueue_failures_total").increment(1);
                }
            }
        }

        counter!("pnl_refresh_sweeps_total", "status" => "ok").increment(1);
        counter!("pnl_refresh_jobs_enqueued_total").increment(enqueued as u64);
        info!(
            discovered = assets.len(),
            enqueued,
            queue = %self.queue.name(),
            "refresh sweep enqueued jobs"
        );
        enqueued
    }

    /// Fires every `interval` until `shutdown` flips to true. The first
    /// sweep happens one interval after start.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "refresh scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    self.fire().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("refresh scheduler stopped");
    }
}
