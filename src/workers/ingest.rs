use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::db::{InsertOutcome, Store};
use crate::error::Result;
use crate::source::{ContentSource, Fetched};

use super::{wait_out, BackoffPolicy, Matcher, WorkerState};

/// Counters for one successful poll of the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub fetched: usize,
    pub matched: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

/// Polls the newest items in a tight loop and captures the matching ones.
///
/// Several of these run side by side against the same store; the store's
/// insert-if-absent is what keeps them from recording an item twice.
pub struct IngestWorker<S, R> {
    name: String,
    source: S,
    store: R,
    matcher: Arc<Matcher>,
    batch_size: usize,
    backoff: BackoffPolicy,
}

impl<S: ContentSource, R: Store> IngestWorker<S, R> {
    pub fn new(
        name: impl Into<String>,
        source: S,
        store: R,
        matcher: Arc<Matcher>,
        batch_size: usize,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            store,
            matcher,
            batch_size,
            backoff,
        }
    }

    /// Fetches one batch and stores every new match.
    ///
    /// A rate-limited fetch touches nothing and hands the delay back so the
    /// caller can retry the same fetch later.
    pub async fn poll_once(&self) -> Result<Fetched<PollStats>> {
        let items = match self.source.fetch_recent(self.batch_size).await? {
            Fetched::Ready(items) => items,
            Fetched::RateLimited(delay) => return Ok(Fetched::RateLimited(delay)),
        };

        let mut stats = PollStats {
            fetched: items.len(),
            ..PollStats::default()
        };

        for item in &items {
            let Some(captured) = self.matcher.capture(item) else {
                continue;
            };
            stats.matched += 1;

            match self.store.insert_if_absent(&captured).await? {
                InsertOutcome::Inserted => {
                    stats.inserted += 1;
                    info!(
                        worker = %self.name,
                        id = %captured.id,
                        origin = %captured.origin,
                        "Captured comment"
                    );
                }
                InsertOutcome::AlreadyExists => {
                    stats.duplicates += 1;
                    debug!(worker = %self.name, id = %captured.id, "Already captured");
                }
            }
        }

        Ok(Fetched::Ready(stats))
    }

    /// Runs until `cancel` fires. Any error other than a rate limit ends the
    /// worker; restarting it is the supervisor's job.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!(worker = %self.name, batch_size = self.batch_size, "Ingest worker started");

        let mut state = WorkerState::Running;
        loop {
            state = match state {
                WorkerState::Running if cancel.is_cancelled() => WorkerState::Terminating,
                WorkerState::Running => match self.poll_once().await? {
                    Fetched::Ready(stats) => {
                        debug!(worker = %self.name, ?stats, "Poll complete");
                        WorkerState::Running
                    }
                    Fetched::RateLimited(requested) => {
                        let delay = self.backoff.clamp(requested);
                        warn!(
                            worker = %self.name,
                            retry_after_secs = requested.as_secs(),
                            backoff_secs = delay.as_secs(),
                            "Rate-limited by content source, backing off"
                        );
                        WorkerState::Backoff(delay)
                    }
                },
                WorkerState::Backoff(delay) => {
                    if wait_out(delay, &cancel).await {
                        WorkerState::Running
                    } else {
                        WorkerState::Terminating
                    }
                }
                WorkerState::Terminating => {
                    info!(worker = %self.name, "Ingest worker stopped");
                    return Ok(());
                }
            };
        }
    }
}
