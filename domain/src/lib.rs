use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const MAX_ASSET_ID_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: &'static str,
}

impl ValidationError {
    pub fn new(field: &'static str, message: &'static str) -> Self {
        Self { field, message }
    }
}

fn check(ok: bool, field: &'static str, message: &'static str) -> Result<(), ValidationError> {
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new(field, message))
    }
}

/// One owner's position in one tracked asset.
///
/// `pnl` is derived: it holds `quantity * price - total_cost` for the price
/// seen at the last recompute and is never edited directly.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Holding {
    pub asset_id: String,
    pub owner_id: Uuid,
    pub symbol: String,
    pub quantity: f64,
    pub avg_price: f64,
    pub total_cost: f64,
    pub pnl: f64,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl Holding {
    pub fn compute_pnl(quantity: f64, total_cost: f64, price: f64) -> f64 {
        quantity * price - total_cost
    }

    pub fn recompute_pnl(&mut self, price: f64) {
        self.pnl = Self::compute_pnl(self.quantity, self.total_cost, price);
    }

    /// Merges an additional purchase into the position and re-derives the
    /// average price from the new cost basis.
    pub fn top_up(&mut self, quantity: f64, purchase_price: f64) {
        self.total_cost += quantity * purchase_price;
        self.quantity += quantity;
        self.avg_price = self.total_cost / self.quantity;
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewHolding {
    pub asset_id: String,
    pub quantity: f64,
    pub purchase_price: f64,
}

impl NewHolding {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check(!self.asset_id.trim().is_empty(), "asset_id", "must be provided")?;
        check(
            self.asset_id.len() <= MAX_ASSET_ID_LEN,
            "asset_id",
            "must not be longer than 100 bytes",
        )?;
        validate_top_up(self.quantity, self.purchase_price)
    }

    pub fn into_holding(self, owner_id: Uuid, symbol: String, current_price: f64) -> Holding {
        let total_cost = self.quantity * self.purchase_price;
        Holding {
            asset_id: self.asset_id.trim().to_string(),
            owner_id,
            symbol,
            quantity: self.quantity,
            avg_price: self.purchase_price,
            total_cost,
            pnl: Holding::compute_pnl(self.quantity, total_cost, current_price),
            version: 1,
            created_at: Utc::now(),
        }
    }
}

pub fn validate_top_up(quantity: f64, purchase_price: f64) -> Result<(), ValidationError> {
    check(quantity > 0.0, "quantity", "must be greater than zero")?;
    check(purchase_price > 0.0, "purchase_price", "must be greater than zero")
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HoldingSort {
    #[default]
    QuantityAsc,
    QuantityDesc,
    PnlAsc,
    PnlDesc,
    AssetIdAsc,
    AssetIdDesc,
}

impl HoldingSort {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.trim().to_lowercase().as_str() {
            "quantity_asc" => Ok(Self::QuantityAsc),
            "quantity_desc" => Ok(Self::QuantityDesc),
            "pnl_asc" => Ok(Self::PnlAsc),
            "pnl_desc" => Ok(Self::PnlDesc),
            "asset_id_asc" => Ok(Self::AssetIdAsc),
            "asset_id_desc" => Ok(Self::AssetIdDesc),
            _ => Err(ValidationError::new("sort", "invalid sort value")),
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::QuantityAsc | Self::QuantityDesc => "quantity",
            Self::PnlAsc | Self::PnlDesc => "pnl",
            Self::AssetIdAsc | Self::AssetIdDesc => "asset_id",
        }
    }

    pub fn direction(self) -> &'static str {
        match self {
            Self::QuantityAsc | Self::PnlAsc | Self::AssetIdAsc => "ASC",
            Self::QuantityDesc | Self::PnlDesc | Self::AssetIdDesc => "DESC",
        }
    }

    fn compare(self, a: &Holding, b: &Holding) -> Ordering {
        let ordering = match self.column() {
            "quantity" => a.quantity.total_cmp(&b.quantity),
            "pnl" => a.pnl.total_cmp(&b.pnl),
            _ => a.asset_id.cmp(&b.asset_id),
        };
        let ordering = if self.direction() == "DESC" {
            ordering.reverse()
        } else {
            ordering
        };
        ordering.then_with(|| a.asset_id.cmp(&b.asset_id))
    }
}

/// Search, sort and paging for an owner's holdings listing.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingFilters {
    /// Case-insensitive match on asset id or symbol; empty matches all.
    pub search: String,
    pub page: u32,
    pub per_page: u32,
    pub sort: HoldingSort,
}

impl Default for HoldingFilters {
    fn default() -> Self {
        Self {
            search: String::new(),
            page: 1,
            per_page: 20,
            sort: HoldingSort::default(),
        }
    }
}

impl HoldingFilters {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check(self.page > 0, "page", "must be greater than zero")?;
        check(self.page <= 10_000, "page", "must be a maximum of 10000")?;
        check(self.per_page > 0, "per_page", "must be greater than zero")?;
        check(self.per_page <= 100, "per_page", "must be a maximum of 100")
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }

    pub fn matches(&self, holding: &Holding) -> bool {
        let needle = self.search.trim();
        needle.is_empty()
            || holding.asset_id.eq_ignore_ascii_case(needle)
            || holding.symbol.eq_ignore_ascii_case(needle)
    }

    /// Filters, sorts and pages an already-loaded listing the same way the
    /// storage query does.
    pub fn apply(&self, holdings: Vec<Holding>) -> Vec<Holding> {
        let mut selected: Vec<Holding> = holdings.into_iter().filter(|h| self.matches(h)).collect();
        selected.sort_by(|a, b| self.sort.compare(a, b));
        selected
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.limit() as usize)
            .collect()
    }
}

/// Request to recompute PNL for every holder of one asset.
///
/// Carries no snapshot of holder state: processing re-reads storage, so a
/// job gives the same result however late or often it is handled.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct RefreshJob {
    pub asset_id: String,
}

impl RefreshJob {
    pub fn new(asset_id: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
        }
    }

    pub fn parse(payload: &str) -> Result<Self, ValidationError> {
        let asset_id = payload.trim();
        check(!asset_id.is_empty(), "asset_id", "must be provided")?;
        check(
            asset_id.len() <= MAX_ASSET_ID_LEN,
            "asset_id",
            "must not be longer than 100 bytes",
        )?;
        Ok(Self::new(asset_id))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CachedPrice {
    pub price: f64,
    pub symbol: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MarketSummary {
    #[serde(default)]
    pub market_cap_rank: Option<i64>,
    pub symbol: String,
    pub id: String,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub price_change_24h: Option<f64>,
    #[serde(default)]
    pub circulating_supply: Option<f64>,
    #[serde(default)]
    pub max_supply: Option<f64>,
    #[serde(default)]
    pub ath: Option<f64>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

const MARKET_ORDERS: [&str; 4] = ["market_cap_asc", "market_cap_desc", "id_asc", "id_desc"];

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MarketFilters {
    pub ids: String,
    pub page: u32,
    pub per_page: u32,
    pub order: String,
}

impl Default for MarketFilters {
    fn default() -> Self {
        Self {
            ids: String::new(),
            page: 1,
            per_page: 20,
            order: "market_cap_desc".to_string(),
        }
    }
}

impl MarketFilters {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check(self.page > 0, "page", "must be greater than zero")?;
        check(self.page < 100, "page", "must be less than 100")?;
        check(self.per_page > 0, "per_page", "must be greater than zero")?;
        check(self.per_page < 250, "per_page", "must be less than 250")?;
        check(
            MARKET_ORDERS.contains(&self.order.as_str()),
            "order",
            "must be a valid order type",
        )
    }
}
