mod ingest;
mod matcher;
mod update;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use ingest::IngestWorker;
pub use matcher::Matcher;
pub use update::UpdateWorker;

/// Lifecycle of a single worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Backoff(Duration),
    Terminating,
}

/// Caps how long a worker will honour a rate-limit request.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(max: Duration) -> Self {
        Self { max }
    }

    pub fn clamp(&self, requested: Duration) -> Duration {
        requested.min(self.max)
    }
}

/// Sleeps for `delay` unless cancelled first. Returns `false` on cancellation.
pub async fn wait_out(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
