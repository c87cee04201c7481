//! Cache key naming. Writers and invalidators both go through these
//! functions so an owner maps to exactly one aggregate key.

use uuid::Uuid;

pub const OWNER_HOLDINGS_PREFIX: &str = "user:holdings:";
pub const OWNER_HOLDINGS_PATTERN: &str = "user:holdings:*";
pub const ASSET_PRICE_PREFIX: &str = "coin:price:";

pub fn owner_holdings(owner_id: Uuid) -> String {
    format!("{OWNER_HOLDINGS_PREFIX}{owner_id}")
}

pub fn owner_holdings_many<I>(owner_ids: I) -> Vec<String>
where
    I: IntoIterator<Item = Uuid>,
{
    let mut keys: Vec<String> = owner_ids.into_iter().map(owner_holdings).collect();
    keys.sort();
    keys.dedup();
    keys
}

pub fn asset_price(asset_id: &str) -> String {
    format!("{ASSET_PRICE_PREFIX}{asset_id}")
}
