use std::{env, time::Duration};

use anyhow::{Context, Result};

pub const DEFAULT_MARKET_API_BASE: &str = "https://api.coingecko.com/api/v3";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub market_api_base: String,
    pub market_api_key: String,
    pub market_http_timeout: Duration,
    pub refresh_interval: Duration,
    pub refresh_queue_name: String,
    pub queue_pop_timeout: Duration,
    pub cache_default_ttl: Duration,
    pub enable_refresh_pipeline: bool,
    pub frontend_origins: Vec<String>,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let market_api_key = env::var("MARKET_API_KEY").unwrap_or_default();
        if market_api_key.is_empty() {
            tracing::warn!("MARKET_API_KEY not set; market API requests are sent without a key");
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set for the PNL tracker")?,
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()),
            market_api_base: env::var("MARKET_API_BASE")
                .unwrap_or_else(|_| DEFAULT_MARKET_API_BASE.to_string()),
            market_api_key,
            market_http_timeout: parse_duration_seconds("MARKET_HTTP_TIMEOUT_SECS", 10),
            refresh_interval: parse_duration_seconds("REFRESH_INTERVAL_SECS", 600),
            refresh_queue_name: env::var("REFRESH_QUEUE_NAME")
                .ok()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| job_queue::DEFAULT_QUEUE_NAME.to_string()),
            queue_pop_timeout: parse_duration_seconds("QUEUE_POP_TIMEOUT_SECS", 5),
            cache_default_ttl: parse_duration_seconds("CACHE_DEFAULT_TTL_SECS", 600),
            enable_refresh_pipeline: parse_bool("ENABLE_REFRESH_PIPELINE", true),
            frontend_origins: parse_origins(),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8081".to_string())
                .parse()
                .context("PORT must be a valid u16")?,
        })
    }
}

fn parse_origins() -> Vec<String> {
    match env::var("FRONTEND_ORIGINS") {
        Ok(list) => split_origins(&list),
        Err(_) => vec!["http://localhost:3000".to_string()],
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|item| {
            let trimmed = item.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn parse_duration_seconds(key: &str, default: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default))
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
        .unwrap_or(default)
}
