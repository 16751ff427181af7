mod repository;
mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{CapturedItem, Checkpoint};

pub use repository::Repository;

/// Result of an insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same id was already stored. This is the normal
    /// outcome when several ingestion workers see the same item.
    AlreadyExists,
}

/// The durable record store shared by all units.
///
/// Every mutation is a single-row conditional write, so units never need to
/// coordinate beyond what the store itself guarantees.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_if_absent(&self, item: &CapturedItem) -> Result<InsertOutcome>;

    /// Records created before `checkpoint.cutoff(now)` that still lack the
    /// checkpoint's score and are not deleted, oldest first.
    async fn find_due(&self, checkpoint: Checkpoint, now: DateTime<Utc>)
        -> Result<Vec<CapturedItem>>;

    /// Sets the checkpoint score if it is still unset and the record is not
    /// deleted. Returns whether a row was written.
    async fn record_score(&self, id: &str, checkpoint: Checkpoint, score: i64) -> Result<bool>;

    /// Flags the record as deleted. Returns whether a row was written.
    async fn mark_deleted(&self, id: &str) -> Result<bool>;

    async fn get(&self, id: &str) -> Result<Option<CapturedItem>>;
}

#[async_trait]
impl<T: Store + ?Sized> Store for Arc<T> {
    async fn insert_if_absent(&self, item: &CapturedItem) -> Result<InsertOutcome> {
        (**self).insert_if_absent(item).await
    }

    async fn find_due(
        &self,
        checkpoint: Checkpoint,
        now: DateTime<Utc>,
    ) -> Result<Vec<CapturedItem>> {
        (**self).find_due(checkpoint, now).await
    }

    async fn record_score(&self, id: &str, checkpoint: Checkpoint, score: i64) -> Result<bool> {
        (**self).record_score(id, checkpoint, score).await
    }

    async fn mark_deleted(&self, id: &str) -> Result<bool> {
        (**self).mark_deleted(id).await
    }

    async fn get(&self, id: &str) -> Result<Option<CapturedItem>> {
        (**self).get(id).await
    }
}
