//! Key/value cache with per-entry TTL.
//!
//! Backed by redis when a URL is configured, otherwise by a process-local
//! map. Every operation is advisory: callers treat errors and misses as
//! "go to the source of truth".

use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

pub mod keys;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend: {0}")]
    Backend(String),
    #[error("cache codec: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

struct MemoryEntry {
    payload: String,
    expires_at: Instant,
}

#[derive(Clone)]
enum CacheBackend {
    Memory {
        inner: Arc<Mutex<HashMap<String, MemoryEntry>>>,
    },
    Redis {
        client: redis::Client,
    },
}

#[derive(Clone)]
pub struct Cache {
    backend: CacheBackend,
    default_ttl: Duration,
}

impl Cache {
    pub fn new(default_ttl: Duration, redis_url: Option<String>) -> CacheResult<Self> {
        match redis_url {
            Some(url) => Ok(Self {
                backend: CacheBackend::Redis {
                    client: redis::Client::open(url)?,
                },
                default_ttl,
            }),
            None => Ok(Self::in_memory(default_ttl)),
        }
    }

    pub fn in_memory(default_ttl: Duration) -> Self {
        Self {
            backend: CacheBackend::Memory {
                inner: Arc::new(Mutex::new(HashMap::new())),
            },
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Stores `value` as JSON under `key`, replacing any previous entry.
    /// `ttl` falls back to the configured default.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_string(value)?;
        let ttl = ttl.unwrap_or(self.default_ttl).max(Duration::from_millis(1));
        match &self.backend {
            CacheBackend::Memory { inner } => {
                let mut guard = inner.lock().await;
                guard.insert(
                    key.to_string(),
                    MemoryEntry {
                        payload,
                        expires_at: Instant::now() + ttl,
                    },
                );
            }
            CacheBackend::Redis { client } => {
                let mut conn = client.get_multiplexed_async_connection().await?;
                let _: () = redis::cmd("SET")
                    .arg(key)
                    .arg(payload)
                    .arg("PX")
                    .arg(ttl.as_millis() as u64)
                    .query_async(&mut conn)
                    .await?;
            }
        }
        Ok(())
    }

    /// Returns `Ok(None)` for a missing or expired key.
    pub async fn get<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let payload = match &self.backend {
            CacheBackend::Memory { inner } => {
                let mut guard = inner.lock().await;
                match guard.get(key) {
                    Some(entry) if entry.expires_at > Instant::now() => Some(entry.payload.clone()),
                    Some(_) => {
                        guard.remove(key);
                        None
                    }
                    None => None,
                }
            }
            CacheBackend::Redis { client } => {
                let mut conn = client.get_multiplexed_async_connection().await?;
                let payload: Option<String> =
                    redis::cmd("GET").arg(key).query_async(&mut conn).await?;
                payload
            }
        };

        match payload {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        self.delete_many(&[key.to_string()]).await.map(|_| ())
    }

    /// Removes all `keys` in a single batch and reports how many existed.
    pub async fn delete_many(&self, keys: &[String]) -> CacheResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        match &self.backend {
            CacheBackend::Memory { inner } => {
                let mut guard = inner.lock().await;
                let now = Instant::now();
                Ok(keys
                    .iter()
                    .filter_map(|key| guard.remove(key))
                    .filter(|entry| entry.expires_at > now)
                    .count())
            }
            CacheBackend::Redis { client } => {
                let mut conn = client.get_multiplexed_async_connection().await?;
                let removed: usize = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
                Ok(removed)
            }
        }
    }

    /// Deletes every key matching a glob pattern (`*`, `?`) in one batch.
    pub async fn invalidate(&self, pattern: &str) -> CacheResult<usize> {
        let matched = match &self.backend {
            CacheBackend::Memory { inner } => {
                let mut guard = inner.lock().await;
                let matched: Vec<String> = guard
                    .keys()
                    .filter(|key| glob_match(pattern, key))
                    .cloned()
                    .collect();
                for key in &matched {
                    guard.remove(key);
                }
                matched.len()
            }
            CacheBackend::Redis { client } => {
                let mut conn = client.get_multiplexed_async_connection().await?;
                let keys: Vec<String> =
                    redis::cmd("KEYS").arg(pattern).query_async(&mut conn).await?;
                if keys.is_empty() {
                    0
                } else {
                    let removed: usize =
                        redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                    removed
                }
            }
        };
        debug!(pattern, matched, "cache pattern invalidated");
        Ok(matched)
    }
}

fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    let (mut p, mut c) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while c < candidate.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, c));
                p += 1;
            }
            Some('?') => {
                p += 1;
                c += 1;
            }
            Some(ch) if *ch == candidate[c] => {
                p += 1;
                c += 1;
            }
            _ => match backtrack {
                Some((star_p, star_c)) => {
                    p = star_p + 1;
                    c = star_c + 1;
                    backtrack = Some((star_p, star_c + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|ch| *ch == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Quote {
        price: f64,
        symbol: String,
    }

    #[tokio::test]
    async fn set_then_get_round_trips_json() {
        let cache = Cache::in_memory(Duration::from_secs(60));
        let quote = Quote {
            price: 30.0,
            symbol: "btc".to_string(),
        };
        cache.set("coin:price:bitcoin", &quote, None).await.unwrap();
        let cached: Option<Quote> = cache.get("coin:price:bitcoin").await.unwrap();
        assert_eq!(cached, Some(quote));
    }

    #[tokio::test]
    async fn missing_key_is_a_miss_not_an_error() {
        let cache = Cache::in_memory(Duration::from_secs(60));
        let cached: Option<Quote> = cache.get("nope").await.unwrap();
        assert!(cached.is_none());
        cache.delete("nope").await.expect("delete of absent key succeeds");
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = Cache::in_memory(Duration::from_secs(600));
        cache
            .set("short", &1_u32, Some(Duration::from_secs(300)))
            .await
            .unwrap();
        cache.set("long", &2_u32, None).await.unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get::<u32>("short").await.unwrap(), Some(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get::<u32>("short").await.unwrap(), None);
        assert_eq!(cache.get::<u32>("long").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn invalidate_removes_only_matching_keys() {
        let cache = Cache::in_memory(Duration::from_secs(60));
        cache.set("user:holdings:a", &1_u32, None).await.unwrap();
        cache.set("user:holdings:b", &2_u32, None).await.unwrap();
        cache.set("user:holdingsx", &3_u32, None).await.unwrap();
        cache.set("coin:price:btc", &4_u32, None).await.unwrap();

        let removed = cache.invalidate("user:holdings:*").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(cache.get::<u32>("user:holdings:a").await.unwrap(), None);
        assert_eq!(cache.get::<u32>("user:holdingsx").await.unwrap(), Some(3));
        assert_eq!(cache.get::<u32>("coin:price:btc").await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn delete_many_counts_live_entries() {
        let cache = Cache::in_memory(Duration::from_secs(60));
        cache.set("a", &1_u32, None).await.unwrap();
        cache.set("b", &2_u32, None).await.unwrap();
        let removed = cache
            .delete_many(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
    }

    #[test]
    fn glob_supports_star_and_question_mark() {
        assert!(glob_match("user:holdings:*", "user:holdings:42"));
        assert!(glob_match("user:holdings:*", "user:holdings:"));
        assert!(!glob_match("user:holdings:*", "user:holding:42"));
        assert!(glob_match("coin:?:x", "coin:a:x"));
        assert!(!glob_match("coin:?:x", "coin:ab:x"));
        assert!(glob_match("*price*", "coin:price:eth"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    /// Runs against a live server: `REDIS_URL=redis://... cargo test -- --ignored`.
    mod redis_backed {
        use super::*;

        fn redis_url() -> String {
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
        }

        fn redis_cache(default_ttl: Duration) -> Cache {
            Cache::new(default_ttl, Some(redis_url())).expect("valid REDIS_URL")
        }

        fn namespace() -> String {
            format!("test:{}:", uuid::Uuid::new_v4())
        }

        async fn pttl(key: &str) -> i64 {
            let client = redis::Client::open(redis_url()).unwrap();
            let mut conn = client.get_multiplexed_async_connection().await.unwrap();
            redis::cmd("PTTL").arg(key).query_async(&mut conn).await.unwrap()
        }

        #[tokio::test]
        #[ignore = "requires REDIS_URL"]
        async fn set_applies_explicit_and_default_ttls() {
            let cache = redis_cache(Duration::from_secs(600));
            let ns = namespace();
            let (short, long) = (format!("{ns}short"), format!("{ns}long"));
            let quote = Quote {
                price: 30.0,
                symbol: "btc".to_string(),
            };

            cache
                .set(&short, &quote, Some(Duration::from_millis(150)))
                .await
                .unwrap();
            cache.set(&long, &quote, None).await.unwrap();
            assert_eq!(cache.get::<Quote>(&short).await.unwrap(), Some(quote));

            let remaining = pttl(&long).await;
            assert!(remaining > 590_000 && remaining <= 600_000, "{remaining}");

            tokio::time::sleep(Duration::from_millis(400)).await;
            assert_eq!(cache.get::<Quote>(&short).await.unwrap(), None);
            cache.delete(&long).await.unwrap();
            assert_eq!(cache.get::<Quote>(&long).await.unwrap(), None);
        }

        #[tokio::test]
        #[ignore = "requires REDIS_URL"]
        async fn delete_many_and_invalidate_hit_only_their_keys() {
            let cache = redis_cache(Duration::from_secs(60));
            let ns = namespace();
            for key in ["user:holdings:a", "user:holdings:b", "user:holdingsx", "coin:price:btc"] {
                cache.set(&format!("{ns}{key}"), &1_u32, None).await.unwrap();
            }

            let removed = cache
                .invalidate(&format!("{ns}user:holdings:*"))
                .await
                .unwrap();
            assert_eq!(removed, 2);
            assert_eq!(cache.invalidate(&format!("{ns}user:holdings:*")).await.unwrap(), 0);

            let removed = cache
                .delete_many(&[
                    format!("{ns}user:holdingsx"),
                    format!("{ns}coin:price:btc"),
                    format!("{ns}absent"),
                ])
                .await
                .unwrap();
            assert_eq!(removed, 2);
            assert_eq!(cache.delete_many(&[]).await.unwrap(), 0);
        }
    }
}
