use std::sync::Arc;

use cache::{keys, Cache};
use domain::{validate_top_up, CachedPrice, Holding, HoldingFilters, NewHolding};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{TrackerError, TrackerResult},
    repositories::HoldingRepository,
};

/// Reads attempted by `top_up` before a version conflict is surfaced.
const TOP_UP_ATTEMPTS: usize = 3;

/// Per-asset result of a PNL sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshOutcome {
    pub updated: usize,
    pub conflicts: usize,
    pub failed: usize,
}

impl RefreshOutcome {
    pub fn holders(&self) -> usize {
        self.updated + self.conflicts + self.failed
    }
}

/// Owns persisted holdings and keeps the per-owner aggregate cache honest.
///
/// Cache failures never fail a call: reads fall through to storage and
/// failed invalidations are logged, leaving at worst a stale entry that
/// expires on its TTL.
#[derive(Clone)]
pub struct AssetStore {
    repo: Arc<dyn HoldingRepository>,
    cache: Cache,
}

impl AssetStore {
    pub fn new(repo: Arc<dyn HoldingRepository>, cache: Cache) -> Self {
        Self { repo, cache }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Live set of asset ids with at least one holder, read fresh each call.
    pub async fn discover_tracked_assets(&self) -> TrackerResult<Vec<String>> {
        self.repo.distinct_asset_ids().await
    }

    /// Re-derives PNL for every holder of `asset_id` at `price`.
    ///
    /// Each row is written under its version; a conflicting or failing row
    /// is logged and skipped so the remaining holders still refresh. The
    /// aggregate entries of every holder seen are evicted before the first
    /// write and again after the last, whatever happened to individual rows,
    /// so a sweep cut short leaves no listing older than storage.
    pub async fn recompute_pnl(&self, asset_id: &str, price: f64) -> TrackerResult<RefreshOutcome> {
        let holders = self.repo.holders_of(asset_id).await?;
        let stale = keys::owner_holdings_many(holders.iter().map(|h| h.owner_id));
        self.evict_many(asset_id, &stale).await;
        let mut outcome = RefreshOutcome::default();

        for holding in &holders {
            let pnl = Holding::compute_pnl(holding.quantity, holding.total_cost, price);
            match self
                .repo
                .update_pnl(asset_id, holding.owner_id, pnl, holding.version)
                .await
            {
                Ok(_) => outcome.updated += 1,
                Err(TrackerError::EditConflict) => {
                    outcome.conflicts += 1;
                    warn!(
                        asset_id,
                        owner_id = %holding.owner_id,
                        "holding changed during pnl sweep, skipping"
                    );
                }
                Err(err) => {
                    outcome.failed += 1;
                    warn!(
                        error = %err,
                        asset_id,
                        owner_id = %holding.owner_id,
                        "pnl update failed, skipping"
                    );
                }
            }
        }

        self.evict_many(asset_id, &stale).await;

        info!(
            asset_id,
            price,
            updated = outcome.updated,
            conflicts = outcome.conflicts,
            failed = outcome.failed,
            "pnl recomputed"
        );
        Ok(outcome)
    }

    /// Version-checked write of quantity, cost basis and PNL. On success the
    /// holding carries its new version and only its owner's entry is evicted.
    pub async fn update_holding(&self, holding: &mut Holding) -> TrackerResult<()> {
        holding.version = self.repo.update(holding).await?;
        self.evict_owner(holding.owner_id).await;
        Ok(())
    }

    /// Serves from the owner's aggregate entry when present; a miss reads
    /// storage and leaves the cache empty.
    pub async fn holdings_for_owner(
        &self,
        owner_id: Uuid,
        filters: &HoldingFilters,
    ) -> TrackerResult<Vec<Holding>> {
        filters.validate()?;
        match self
            .cache
            .get::<Vec<Holding>>(&keys::owner_holdings(owner_id))
            .await
        {
            Ok(Some(cached)) => return Ok(filters.apply(cached)),
            Ok(None) => {}
            Err(err) => warn!(error = %err, %owner_id, "aggregate cache read failed"),
        }
        self.repo.list_for_owner(owner_id, filters).await
    }

    pub async fn get_holding(&self, owner_id: Uuid, asset_id: &str) -> TrackerResult<Holding> {
        self.repo
            .find(owner_id, asset_id)
            .await?
            .ok_or(TrackerError::NotFound)
    }

    pub async fn ensure_absent(&self, owner_id: Uuid, asset_id: &str) -> TrackerResult<()> {
        match self.repo.find(owner_id, asset_id.trim()).await? {
            Some(existing) => Err(TrackerError::AlreadyExists(existing.asset_id)),
            None => Ok(()),
        }
    }

    /// Inserts a new position priced at `quote`, then rebuilds the owner's
    /// aggregate entry from storage. See `prime_owner_cache` for how a
    /// concurrent write is kept from being masked.
    pub async fn add_holding(
        &self,
        owner_id: Uuid,
        input: NewHolding,
        quote: &CachedPrice,
    ) -> TrackerResult<Holding> {
        input.validate()?;
        let holding = input.into_holding(owner_id, quote.symbol.clone(), quote.price);
        let stored = self.repo.insert(&holding).await?;

        self.evict_owner(owner_id).await;
        if let Err(err) = self.prime_owner_cache(owner_id).await {
            warn!(error = %err, %owner_id, "aggregate cache prime failed");
        }
        info!(%owner_id, asset_id = %stored.asset_id, "holding added");
        Ok(stored)
    }

    /// Merges a purchase into an existing position and re-prices it.
    ///
    /// A version conflict (typically a PNL sweep landing between the read
    /// and the write) re-reads the row and merges again, up to
    /// `TOP_UP_ATTEMPTS` reads.
    pub async fn top_up(
        &self,
        owner_id: Uuid,
        asset_id: &str,
        quantity: f64,
        purchase_price: f64,
        current_price: f64,
    ) -> TrackerResult<Holding> {
        validate_top_up(quantity, purchase_price)?;
        let mut attempt = 1;
        loop {
            let mut holding = self.get_holding(owner_id, asset_id).await?;
            holding.top_up(quantity, purchase_price);
            holding.recompute_pnl(current_price);
            match self.update_holding(&mut holding).await {
                Ok(()) => return Ok(holding),
                Err(TrackerError::EditConflict) if attempt < TOP_UP_ATTEMPTS => {
                    debug!(%owner_id, asset_id, attempt, "top-up raced another write, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn delete_holding(&self, owner_id: Uuid, asset_id: &str) -> TrackerResult<()> {
        if !self.repo.delete(owner_id, asset_id).await? {
            return Err(TrackerError::NotFound);
        }
        self.evict_owner(owner_id).await;
        info!(%owner_id, asset_id, "holding deleted");
        Ok(())
    }

    /// Stores the owner's full, unpaged listing as their aggregate entry.
    ///
    /// The rows are read again after the cache write; if any version or
    /// position changed meanwhile the entry is evicted. A writer that lands
    /// after the second read evicts on its own, so the entry never outlives
    /// a write it does not reflect.
    pub async fn prime_owner_cache(&self, owner_id: Uuid) -> TrackerResult<()> {
        let key = keys::owner_holdings(owner_id);
        let all = self.repo.list_all_for_owner(owner_id).await?;
        self.cache.set(&key, &all, None).await?;

        let current = self.repo.list_all_for_owner(owner_id).await?;
        if row_versions(&current) != row_versions(&all) {
            debug!(%owner_id, "holdings changed while priming, evicting");
            self.cache.delete(&key).await?;
        }
        Ok(())
    }

    /// Drops every owner's aggregate entry in one batch.
    pub async fn flush_owner_caches(&self) -> TrackerResult<usize> {
        Ok(self.cache.invalidate(keys::OWNER_HOLDINGS_PATTERN).await?)
    }

    async fn evict_owner(&self, owner_id: Uuid) {
        if let Err(err) = self.cache.delete(&keys::owner_holdings(owner_id)).await {
            warn!(error = %err, %owner_id, "aggregate cache eviction failed");
        }
    }

    async fn evict_many(&self, asset_id: &str, stale: &[String]) {
        if let Err(err) = self.cache.delete_many(stale).await {
            warn!(error = %err, asset_id, keys = stale.len(), "aggregate cache eviction failed");
        }
    }
}

fn row_versions(rows: &[Holding]) -> Vec<(&str, i32)> {
    rows.iter().map(|h| (h.asset_id.as_str(), h.version)).collect()
}
