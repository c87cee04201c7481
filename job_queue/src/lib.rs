//! FIFO work queue of [`RefreshJob`]s.
//!
//! The redis backend is a plain list (`RPUSH` to the tail, `BLPOP` from the
//! head) so producers and consumers may live in different processes. The
//! memory backend only reaches consumers in the same process.
//!
//! Delivery is at-least-once at best: a job popped by a consumer that dies
//! before finishing it is gone until the next scheduler sweep.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use domain::{RefreshJob, ValidationError};
use thiserror::Error;
use tokio::{
    sync::{Mutex, Notify},
    time::Instant,
};
use tracing::debug;

pub const DEFAULT_QUEUE_NAME: &str = "pnl_queue";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend: {0}")]
    Backend(String),
    #[error("invalid job payload {payload:?}: {source}")]
    InvalidPayload {
        payload: String,
        source: ValidationError,
    },
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        QueueError::Backend(err.to_string())
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Clone)]
enum QueueBackend {
    Memory {
        items: Arc<Mutex<VecDeque<String>>>,
        ready: Arc<Notify>,
    },
    Redis {
        client: redis::Client,
    },
}

#[derive(Clone)]
pub struct RefreshQueue {
    backend: QueueBackend,
    name: String,
}

impl RefreshQueue {
    pub fn new(name: impl Into<String>, redis_url: Option<String>) -> QueueResult<Self> {
        match redis_url {
            Some(url) => Ok(Self {
                backend: QueueBackend::Redis {
                    client: redis::Client::open(url)?,
                },
                name: name.into(),
            }),
            None => Ok(Self::in_memory(name)),
        }
    }

    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            backend: QueueBackend::Memory {
                items: Arc::new(Mutex::new(VecDeque::new())),
                ready: Arc::new(Notify::new()),
            },
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_distributed(&self) -> bool {
        matches!(self.backend, QueueBackend::Redis { .. })
    }

    pub async fn push(&self, job: &RefreshJob) -> QueueResult<()> {
        match &self.backend {
            QueueBackend::Memory { items, ready } => {
                items.lock().await.push_back(job.asset_id.clone());
                ready.notify_one();
            }
            QueueBackend::Redis { client } => {
                let mut conn = client.get_multiplexed_async_connection().await?;
                let _: usize = redis::cmd("RPUSH")
                    .arg(&self.name)
                    .arg(&job.asset_id)
                    .query_async(&mut conn)
                    .await?;
            }
        }
        debug!(queue = %self.name, asset_id = %job.asset_id, "refresh job enqueued");
        Ok(())
    }

    /// Pops the head job, waiting at most `wait` for one to arrive.
    /// `Ok(None)` means the wait elapsed with the queue empty.
    pub async fn pop(&self, wait: Duration) -> QueueResult<Option<RefreshJob>> {
        let payload = match &self.backend {
            QueueBackend::Memory { items, ready } => {
                let deadline = Instant::now() + wait;
                loop {
                    if let Some(payload) = items.lock().await.pop_front() {
                        break Some(payload);
                    }
                    if tokio::time::timeout_at(deadline, ready.notified())
                        .await
                        .is_err()
                    {
                        break items.lock().await.pop_front();
                    }
                }
            }
            QueueBackend::Redis { client } => {
                let mut conn = client.get_multiplexed_async_connection().await?;
                // BLPOP takes whole seconds; 0 would block forever.
                let timeout_secs = wait.as_secs().max(1);
                let popped: Option<(String, String)> = redis::cmd("BLPOP")
                    .arg(&self.name)
                    .arg(timeout_secs)
                    .query_async(&mut conn)
                    .await?;
                popped.map(|(_, payload)| payload)
            }
        };

        match payload {
            Some(payload) => RefreshJob::parse(&payload)
                .map(Some)
                .map_err(|source| QueueError::InvalidPayload { payload, source }),
            None => Ok(None),
        }
    }

    pub async fn len(&self) -> QueueResult<usize> {
        match &self.backend {
            QueueBackend::Memory { items, .. } => Ok(items.lock().await.len()),
            QueueBackend::Redis { client } => {
                let mut conn = client.get_multiplexed_async_connection().await?;
                let len: usize = redis::cmd("LLEN")
                    .arg(&self.name)
                    .query_async(&mut conn)
                    .await?;
                Ok(len)
            }
        }
    }

    pub async fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len().await? == 0)
    }
}
