use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use domain::{Holding, HoldingFilters};
use sqlx::{postgres::PgRow, PgPool, Row};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{TrackerError, TrackerResult};

#[async_trait]
pub trait HoldingRepository: Send + Sync {
    /// Persists a new holding and returns it with the stored version and
    /// creation time.
    async fn insert(&self, holding: &Holding) -> TrackerResult<Holding>;
    async fn find(&self, owner_id: Uuid, asset_id: &str) -> TrackerResult<Option<Holding>>;
    async fn list_for_owner(
        &self,
        owner_id: Uuid,
        filters: &HoldingFilters,
    ) -> TrackerResult<Vec<Holding>>;
    async fn list_all_for_owner(&self, owner_id: Uuid) -> TrackerResult<Vec<Holding>>;
    async fn distinct_asset_ids(&self) -> TrackerResult<Vec<String>>;
    async fn holders_of(&self, asset_id: &str) -> TrackerResult<Vec<Holding>>;
    /// Writes quantity, cost basis and PNL if the stored version still
    /// equals `holding.version`; returns the bumped version.
    async fn update(&self, holding: &Holding) -> TrackerResult<i32>;
    /// Writes only the PNL column under the same version check as `update`.
    async fn update_pnl(
        &self,
        asset_id: &str,
        owner_id: Uuid,
        pnl: f64,
        expected_version: i32,
    ) -> TrackerResult<i32>;
    async fn delete(&self, owner_id: Uuid, asset_id: &str) -> TrackerResult<bool>;
}

const HOLDING_COLUMNS: &str =
    "asset_id, owner_id, symbol, quantity, avg_price, total_cost, pnl, version, created_at";

#[derive(Clone)]
pub struct PostgresHoldingRepository {
    pool: PgPool,
}

impl PostgresHoldingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_holding(row: &PgRow) -> TrackerResult<Holding> {
        Ok(Holding {
            asset_id: row.try_get("asset_id")?,
            owner_id: row.try_get("owner_id")?,
            symbol: row.try_get("symbol")?,
            quantity: row.try_get("quantity")?,
            avg_price: row.try_get("avg_price")?,
            total_cost: row.try_get("total_cost")?,
            pnl: row.try_get("pnl")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl HoldingRepository for PostgresHoldingRepository {
    async fn insert(&self, holding: &Holding) -> TrackerResult<Holding> {
        let row = sqlx::query(
            "INSERT INTO holdings (asset_id, owner_id, symbol, quantity, avg_price, total_cost, pnl)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING created_at, version",
        )
        .bind(&holding.asset_id)
        .bind(holding.owner_id)
        .bind(&holding.symbol)
        .bind(holding.quantity)
        .bind(holding.avg_price)
        .bind(holding.total_cost)
        .bind(holding.pnl)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if let sqlx::Error::Database(db) = &err {
                if db.is_unique_violation() {
                    return TrackerError::AlreadyExists(holding.asset_id.clone());
                }
            }
            TrackerError::Database(err)
        })?;

        let mut stored = holding.clone();
        stored.created_at = row.try_get("created_at")?;
        stored.version = row.try_get("version")?;
        Ok(stored)
    }

    async fn find(&self, owner_id: Uuid, asset_id: &str) -> TrackerResult<Option<Holding>> {
        let row = sqlx::query(&format!(
            "SELECT {HOLDING_COLUMNS} FROM holdings WHERE owner_id = $1 AND asset_id = $2"
        ))
        .bind(owner_id)
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| Self::row_to_holding(&row)).transpose()
    }

    async fn list_for_owner(
        &self,
        owner_id: Uuid,
        filters: &HoldingFilters,
    ) -> TrackerResult<Vec<Holding>> {
        // Sort column and direction come from a closed enum, never from input text.
        let query = format!(
            "SELECT {HOLDING_COLUMNS}
             FROM holdings
             WHERE owner_id = $1
               AND (LOWER(asset_id) = LOWER($2) OR LOWER(symbol) = LOWER($2) OR $2 = '')
             ORDER BY {} {}, asset_id ASC
             LIMIT $3 OFFSET $4",
            filters.sort.column(),
            filters.sort.direction()
        );
        let rows = sqlx::query(&query)
            .bind(owner_id)
            .bind(filters.search.trim())
            .bind(filters.limit())
            .bind(filters.offset())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_holding).collect()
    }

    async fn list_all_for_owner(&self, owner_id: Uuid) -> TrackerResult<Vec<Holding>> {
        let rows = sqlx::query(&format!(
            "SELECT {HOLDING_COLUMNS} FROM holdings WHERE owner_id = $1 ORDER BY asset_id ASC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_holding).collect()
    }

    async fn distinct_asset_ids(&self) -> TrackerResult<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT asset_id FROM holdings ORDER BY asset_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    async fn holders_of(&self, asset_id: &str) -> TrackerResult<Vec<Holding>> {
        let rows = sqlx::query(&format!(
            "SELECT {HOLDING_COLUMNS} FROM holdings WHERE asset_id = $1"
        ))
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_holding).collect()
    }

    async fn update(&self, holding: &Holding) -> TrackerResult<i32> {
        let mut tx = self.pool.begin().await?;
        let version: Option<i32> = sqlx::query_scalar(
            "UPDATE holdings
             SET quantity = $1, avg_price = $2, total_cost = $3, pnl = $4,
                 version = version + 1, updated_at = NOW()
             WHERE asset_id = $5 AND owner_id = $6 AND version = $7
             RETURNING version",
        )
        .bind(holding.quantity)
        .bind(holding.avg_price)
        .bind(holding.total_cost)
        .bind(holding.pnl)
        .bind(&holding.asset_id)
        .bind(holding.owner_id)
        .bind(holding.version)
        .fetch_optional(&mut *tx)
        .await?;
        let version = version.ok_or(TrackerError::EditConflict)?;
        tx.commit().await?;
        Ok(version)
    }

    async fn update_pnl(
        &self,
        asset_id: &str,
        owner_id: Uuid,
        pnl: f64,
        expected_version: i32,
    ) -> TrackerResult<i32> {
        let version: Option<i32> = sqlx::query_scalar(
            "UPDATE holdings
             SET pnl = $1, version = version + 1, updated_at = NOW()
             WHERE asset_id = $2 AND owner_id = $3 AND version = $4
             RETURNING version",
        )
        .bind(pnl)
        .bind(asset_id)
        .bind(owner_id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;
        version.ok_or(TrackerError::EditConflict)
    }

    async fn delete(&self, owner_id: Uuid, asset_id: &str) -> TrackerResult<bool> {
        let result = sqlx::query("DELETE FROM holdings WHERE owner_id = $1 AND asset_id = $2")
            .bind(owner_id)
            .bind(asset_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Process-local store with the same version semantics as Postgres.
#[derive(Clone, Default)]
pub struct InMemoryHoldingRepository {
    rows: Arc<RwLock<BTreeMap<(Uuid, String), Holding>>>,
}

impl InMemoryHoldingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HoldingRepository for InMemoryHoldingRepository {
    async fn insert(&self, holding: &Holding) -> TrackerResult<Holding> {
        let mut rows = self.rows.write().await;
        let key = (holding.owner_id, holding.asset_id.clone());
        if rows.contains_key(&key) {
            return Err(TrackerError::AlreadyExists(holding.asset_id.clone()));
        }
        let mut stored = holding.clone();
        stored.version = 1;
        rows.insert(key, stored.clone());
        Ok(stored)
    }

    async fn find(&self, owner_id: Uuid, asset_id: &str) -> TrackerResult<Option<Holding>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&(owner_id, asset_id.to_string())).cloned())
    }

    async fn list_for_owner(
        &self,
        owner_id: Uuid,
        filters: &HoldingFilters,
    ) -> TrackerResult<Vec<Holding>> {
        let owned = self.list_all_for_owner(owner_id).await?;
        Ok(filters.apply(owned))
    }

    async fn list_all_for_owner(&self, owner_id: Uuid) -> TrackerResult<Vec<Holding>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|h| h.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn distinct_asset_ids(&self) -> TrackerResult<Vec<String>> {
        let rows = self.rows.read().await;
        let mut ids: Vec<String> = rows.values().map(|h| h.asset_id.clone()).collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn holders_of(&self, asset_id: &str) -> TrackerResult<Vec<Holding>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|h| h.asset_id == asset_id)
            .cloned()
            .collect())
    }

    async fn update(&self, holding: &Holding) -> TrackerResult<i32> {
        let mut rows = self.rows.write().await;
        let stored = rows
            .get_mut(&(holding.owner_id, holding.asset_id.clone()))
            .filter(|stored| stored.version == holding.version)
            .ok_or(TrackerError::EditConflict)?;
        stored.quantity = holding.quantity;
        stored.avg_price = holding.avg_price;
        stored.total_cost = holding.total_cost;
        stored.pnl = holding.pnl;
        stored.version += 1;
        Ok(stored.version)
    }

    async fn update_pnl(
        &self,
        asset_id: &str,
        owner_id: Uuid,
        pnl: f64,
        expected_version: i32,
    ) -> TrackerResult<i32> {
        let mut rows = self.rows.write().await;
        let stored = rows
            .get_mut(&(owner_id, asset_id.to_string()))
            .filter(|stored| stored.version == expected_version)
            .ok_or(TrackerError::EditConflict)?;
        stored.pnl = pnl;
        stored.version += 1;
        Ok(stored.version)
    }

    async fn delete(&self, owner_id: Uuid, asset_id: &str) -> TrackerResult<bool> {
        let mut rows = self.rows.write().await;
        Ok(rows.remove(&(owner_id, asset_id.to_string())).is_some())
    }
}
