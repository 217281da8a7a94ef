//! Background closing of idle sessions.
//!
//! [`IdleSweeper`] owns its tokio task: `start` spawns it, `stop` (or dropping
//! the sweeper) aborts it. [`IdleSweeper::sweep`] runs one pass against an
//! explicit clock so tests never wait on the interval.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::backend::Backend;

pub type SharedBackend = Arc<tokio::sync::Mutex<Backend>>;

pub struct IdleSweeper {
    backend: SharedBackend,
    idle_timeout: chrono::Duration,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IdleSweeper {
    pub fn new(backend: SharedBackend, idle_timeout: Duration, interval: Duration) -> Self {
        let idle_timeout = chrono::Duration::from_std(idle_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        IdleSweeper {
            backend,
            idle_timeout,
            interval,
            task: Mutex::new(None),
        }
    }

    /// One sweep pass as of `now`. Returns the ids of sessions it closed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Vec<String> {
        sweep_once(&self.backend, now, self.idle_timeout).await
    }

    /// Spawns the periodic task. Calling `start` on a running sweeper is a
    /// no-op.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let backend = Arc::clone(&self.backend);
        let idle_timeout = self.idle_timeout;
        let interval = self.interval;
        *task = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            // The first tick completes immediately; skip it so a fresh
            // server does not sweep before anything could have gone idle.
            tick.tick().await;
            loop {
                tick.tick().await;
                sweep_once(&backend, Utc::now(), idle_timeout).await;
            }
        }));
    }

    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

impl Drop for IdleSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweep_once(
    backend: &tokio::sync::Mutex<Backend>,
    now: DateTime<Utc>,
    idle_timeout: chrono::Duration,
) -> Vec<String> {
    let closed = backend.lock().await.close_idle(now, idle_timeout);
    if !closed.is_empty() {
        tracing::info!("Closed {} idle session(s): {:?}", closed.len(), closed);
    }
    closed
}
