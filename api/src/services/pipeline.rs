use std::time::Duration;

use tokio::{sync::watch, task::JoinHandle};
use tracing::{info, warn};

use super::{scheduler::RefreshScheduler, worker::RefreshWorker};

pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Owns the scheduler and worker tasks for the life of the process.
pub struct PipelineSupervisor {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl PipelineSupervisor {
    /// Spawns both loops sharing one shutdown signal.
    pub fn start(scheduler: RefreshScheduler, worker: RefreshWorker) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let tasks = vec![
            ("scheduler", tokio::spawn(scheduler.run(rx.clone()))),
            ("worker", tokio::spawn(worker.run(rx))),
        ];
        info!("refresh pipeline started");
        Self { shutdown, tasks }
    }

    /// Spawns only the worker, for processes that consume jobs scheduled
    /// elsewhere.
    pub fn start_worker(worker: RefreshWorker) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let tasks = vec![("worker", tokio::spawn(worker.run(rx)))];
        info!("refresh worker pipeline started");
        Self { shutdown, tasks }
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|(_, handle)| !handle.is_finished())
    }

    pub async fn stop(self) {
        self.stop_with_grace(DEFAULT_STOP_GRACE).await;
    }

    /// Signals shutdown and waits up to `grace` for each task; tasks still
    /// running after that are aborted.
    pub async fn stop_with_grace(self, grace: Duration) {
        let _ = self.shutdown.send(true);
        let deadline = tokio::time::Instant::now() + grace;

        for (name, mut handle) in self.tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(task = name, error = %err, "pipeline task ended abnormally"),
                Err(_) => {
                    warn!(task = name, "pipeline task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }
        info!("refresh pipeline stopped");
    }
}
