use std::{sync::Arc, time::Duration};

use domain::RefreshJob;
use job_queue::{QueueError, RefreshQueue};
use metrics::counter;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{
    asset_store::{AssetStore, RefreshOutcome},
    market_data::MarketDataClient,
};
use crate::error::TrackerResult;

const BACKEND_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Single consumer of the refresh queue.
#[derive(Clone)]
pub struct RefreshWorker {
    store: AssetStore,
    market: Arc<dyn MarketDataClient>,
    queue: RefreshQueue,
    pop_timeout: Duration,
}

impl RefreshWorker {
    pub fn new(
        store: AssetStore,
        market: Arc<dyn MarketDataClient>,
        queue: RefreshQueue,
        pop_timeout: Duration,
    ) -> Self {
        Self {
            store,
            market,
            queue,
            pop_timeout,
        }
    }

    /// Resolves the current price for the job's asset and sweeps its holders.
    pub async fn process(&self, job: &RefreshJob) -> TrackerResult<RefreshOutcome> {
        let quote = self.market.current_price_and_symbol(&job.asset_id).await?;
        self.store.recompute_pnl(&job.asset_id, quote.price).await
    }

    async fn handle(&self, job: RefreshJob) {
        match self.process(&job).await {
            Ok(outcome) => {
                counter!("pnl_refresh_jobs_total", "status" => "ok").increment(1);
                debug!(asset_id = %job.asset_id, holders = outcome.holders(), "refresh job done");
            }
            Err(err) => {
                counter!("pnl_refresh_jobs_total", "status" => "error").increment(1);
                warn!(error = %err, asset_id = %job.asset_id, "refresh job failed, skipping");
            }
        }
    }

    /// Pops and handles jobs until `shutdown` flips to true. Each pop waits
    /// at most `pop_timeout`, and an in-flight job is abandoned on shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(queue = %self.queue.name(), "refresh worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let popped = tokio::select! {
                popped = self.queue.pop(self.pop_timeout) => popped,
                _ = shutdown.changed() => break,
            };

            match popped {
                Ok(Some(job)) => {
                    tokio::select! {
                        _ = self.handle(job) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Ok(None) => {}
                Err(QueueError::InvalidPayload { payload, source }) => {
                    counter!("pnl_refresh_jobs_total", "status" => "invalid").increment(1);
                    warn!(%payload, error = %source, "dropping malformed refresh job");
                }
                Err(err) => {
                    error!(error = %err, "queue pop failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(BACKEND_RETRY_DELAY) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }
        info!("refresh worker stopped");
    }
}
