use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::db::Store;
use crate::error::Result;
use crate::models::{CapturedItem, Checkpoint};
use crate::source::{ContentSource, Fetched, Lookup};

use super::{wait_out, BackoffPolicy, WorkerState};

/// What a re-fetch revealed about a captured item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecheckOutcome {
    Scored(i64),
    NotFound,
    /// Still addressable but its content was removed.
    EmptyBody,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub due: usize,
    pub scored: usize,
    pub deleted: usize,
    /// Conditional write matched no row (already written or deleted meanwhile).
    pub skipped: usize,
}

/// Re-checks captured items once they are an hour and a day old.
pub struct UpdateWorker<S, R> {
    source: S,
    store: R,
    backoff: BackoffPolicy,
    idle: Duration,
}

impl<S: ContentSource, R: Store> UpdateWorker<S, R> {
    pub fn new(source: S, store: R, backoff: BackoffPolicy, idle: Duration) -> Self {
        Self {
            source,
            store,
            backoff,
            idle,
        }
    }

    /// Re-checks every record owed a `checkpoint` score at `now`.
    ///
    /// Stops early, keeping what was already written, once `cancel` fires.
    pub async fn run_pass(
        &self,
        checkpoint: Checkpoint,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<PassStats> {
        let due = self.store.find_due(checkpoint, now).await?;
        let mut stats = PassStats {
            due: due.len(),
            ..PassStats::default()
        };

        for record in &due {
            if cancel.is_cancelled() {
                break;
            }
            if !record.is_due(checkpoint, now) {
                continue;
            }
            info!(id = %record.id, %checkpoint, "Updating comment");

            let Some(outcome) = self.recheck(record, cancel).await? else {
                break;
            };

            let applied = match outcome {
                RecheckOutcome::Scored(score) => {
                    let applied = self.store.record_score(&record.id, checkpoint, score).await?;
                    if applied {
                        stats.scored += 1;
                    }
                    applied
                }
                RecheckOutcome::NotFound | RecheckOutcome::EmptyBody => {
                    let applied = self.store.mark_deleted(&record.id).await?;
                    if applied {
                        stats.deleted += 1;
                        info!(id = %record.id, %checkpoint, ?outcome, "Comment gone, marked deleted");
                    }
                    applied
                }
            };

            if !applied {
                stats.skipped += 1;
                debug!(id = %record.id, %checkpoint, "Record changed since scan, nothing written");
            }
        }

        Ok(stats)
    }

    /// Both passes, 1h first. Returns how many records were due in total.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<usize> {
        let mut due = 0;
        for checkpoint in Checkpoint::ALL {
            if cancel.is_cancelled() {
                break;
            }
            let stats = self.run_pass(checkpoint, Utc::now(), cancel).await?;
            if stats.due > 0 {
                info!(%checkpoint, ?stats, "Update pass complete");
            }
            due += stats.due;
        }
        Ok(due)
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!("Update worker started");

        let mut state = WorkerState::Running;
        loop {
            state = match state {
                WorkerState::Running if cancel.is_cancelled() => WorkerState::Terminating,
                WorkerState::Running => {
                    let due = self.run_cycle(&cancel).await?;
                    if due > 0 {
                        WorkerState::Running
                    } else if self.idle.is_zero() {
                        tokio::task::yield_now().await;
                        WorkerState::Running
                    } else {
                        WorkerState::Backoff(self.idle)
                    }
                }
                WorkerState::Backoff(delay) => {
                    if wait_out(delay, &cancel).await {
                        WorkerState::Running
                    } else {
                        WorkerState::Terminating
                    }
                }
                WorkerState::Terminating => {
                    info!("Update worker stopped");
                    return Ok(());
                }
            };
        }
    }

    /// Re-fetches `record`, waiting out rate limits. `None` means cancelled
    /// while backing off.
    async fn recheck(
        &self,
        record: &CapturedItem,
        cancel: &CancellationToken,
    ) -> Result<Option<RecheckOutcome>> {
        loop {
            match self.source.fetch_by_permalink(&record.permalink).await? {
                Fetched::Ready(Lookup::Found(item)) if item.has_body() => {
                    return Ok(Some(RecheckOutcome::Scored(item.score)));
                }
                Fetched::Ready(Lookup::Found(_)) => return Ok(Some(RecheckOutcome::EmptyBody)),
                Fetched::Ready(Lookup::NotFound) => return Ok(Some(RecheckOutcome::NotFound)),
                Fetched::RateLimited(requested) => {
                    let delay = self.backoff.clamp(requested);
                    warn!(
                        id = %record.id,
                        retry_after_secs = requested.as_secs(),
                        backoff_secs = delay.as_secs(),
                        "Rate-limited during re-check, backing off"
                    );
                    if !wait_out(delay, cancel).await {
                        return Ok(None);
                    }
                }
            }
        }
    }
}
