pub mod asset_store;
pub mod market_data;
pub mod pipeline;
pub mod scheduler;
pub mod worker;

pub use asset_store::{AssetStore, RefreshOutcome};
pub use market_data::{CoingeckoClient, MarketDataClient, PRICE_CACHE_TTL};
pub use pipeline::PipelineSupervisor;
pub use scheduler::RefreshScheduler;
pub use worker::RefreshWorker;
