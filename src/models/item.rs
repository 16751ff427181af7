use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A comment as seen on the content source at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    /// `None` when the account was deleted.
    pub author: Option<String>,
    pub origin: String,
    /// `None` when the content was deleted or removed.
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub score: i64,
    pub permalink: String,
}

impl Item {
    pub fn has_body(&self) -> bool {
        self.body.as_deref().is_some_and(|b| !b.trim().is_empty())
    }
}
