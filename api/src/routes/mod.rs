pub mod health;
pub mod holdings;
pub mod market;
