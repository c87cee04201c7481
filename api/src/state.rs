use std::sync::Arc;

use job_queue::RefreshQueue;

use crate::{
    config::AppConfig,
    services::{AssetStore, MarketDataClient},
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: AssetStore,
    pub market: Arc<dyn MarketDataClient>,
    pub queue: RefreshQueue,
}

// Ensure critical dependencies uphold Send/Sync for Axum state usage.
#[allow(dead_code)]
fn _assert_state_types_are_send_sync()
where
    AppConfig: Send + Sync + 'static,
    AssetStore: Send + Sync + 'static,
    RefreshQueue: Send + Sync + 'static,
    dyn MarketDataClient: Send + Sync,
{
}

#[allow(dead_code)]
fn _assert_state_bounds() {
    fn assert_bounds<T: Clone + Send + Sync + 'static>() {}
    assert_bounds::<AppState>();
}
