use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::Item;

/// The durable record kept for every matching item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedItem {
    pub id: String,
    pub author: String,
    pub origin: String,
    pub body: String,
    /// Creation time of the item on the source, not the time we saw it.
    pub captured_at: DateTime<Utc>,
    pub score_at_capture: i64,
    pub score_at_1h: Option<i64>,
    pub score_at_24h: Option<i64>,
    pub permalink: String,
    pub deleted: bool,
}

impl CapturedItem {
    /// Builds a fresh record. Returns `None` for items without an author or body.
    pub fn from_item(item: &Item) -> Option<Self> {
        let author = item.author.clone()?;
        let body = item.body.clone()?;

        Some(Self {
            id: item.id.clone(),
            author,
            origin: item.origin.clone(),
            body,
            captured_at: item.created_at,
            score_at_capture: item.score,
            score_at_1h: None,
            score_at_24h: None,
            permalink: item.permalink.clone(),
            deleted: false,
        })
    }

    pub fn score_at(&self, checkpoint: Checkpoint) -> Option<i64> {
        match checkpoint {
            Checkpoint::OneHour => self.score_at_1h,
            Checkpoint::OneDay => self.score_at_24h,
        }
    }

    /// Whether a re-check for `checkpoint` is owed at `now`.
    pub fn is_due(&self, checkpoint: Checkpoint, now: DateTime<Utc>) -> bool {
        !self.deleted
            && self.score_at(checkpoint).is_none()
            && self.captured_at < checkpoint.cutoff(now)
    }
}

/// The fixed delays after creation at which a record's score is re-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Checkpoint {
    OneHour,
    OneDay,
}

impl Checkpoint {
    pub const ALL: [Checkpoint; 2] = [Checkpoint::OneHour, Checkpoint::OneDay];

    pub fn delay(self) -> Duration {
        match self {
            Checkpoint::OneHour => Duration::hours(1),
            Checkpoint::OneDay => Duration::hours(24),
        }
    }

    /// Records created before this instant are old enough to re-check.
    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.delay()
    }

    pub fn label(self) -> &'static str {
        match self {
            Checkpoint::OneHour => "1h",
            Checkpoint::OneDay => "24h",
        }
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(author: Option<&str>, body: Option<&str>) -> Item {
        Item {
            id: "abc".to_string(),
            author: author.map(str::to_string),
            origin: "AskReddit".to_string(),
            body: body.map(str::to_string),
            created_at: Utc::now() - Duration::hours(2),
            score: 3,
            permalink: "/r/AskReddit/comments/x/y/abc/".to_string(),
        }
    }

    #[test]
    fn from_item_starts_unchecked() {
        let captured = CapturedItem::from_item(&item(Some("alice"), Some("hi"))).unwrap();
        assert_eq!(captured.score_at_capture, 3);
        assert_eq!(captured.score_at_1h, None);
        assert_eq!(captured.score_at_24h, None);
        assert!(!captured.deleted);
    }

    #[test]
    fn from_item_requires_author_and_body() {
        assert!(CapturedItem::from_item(&item(None, Some("hi"))).is_none());
        assert!(CapturedItem::from_item(&item(Some("alice"), None)).is_none());
    }

    #[test]
    fn young_records_are_not_due() {
        let now = Utc::now();
        let mut captured = CapturedItem::from_item(&item(Some("alice"), Some("hi"))).unwrap();
        captured.captured_at = now - Duration::minutes(59);
        assert!(!captured.is_due(Checkpoint::OneHour, now));

        captured.captured_at = now - Duration::minutes(61);
        assert!(captured.is_due(Checkpoint::OneHour, now));
        assert!(!captured.is_due(Checkpoint::OneDay, now));
    }

    #[test]
    fn deleted_records_are_never_due() {
        let now = Utc::now();
        let mut captured = CapturedItem::from_item(&item(Some("alice"), Some("hi"))).unwrap();
        captured.captured_at = now - Duration::hours(30);
        captured.deleted = true;
        for checkpoint in Checkpoint::ALL {
            assert!(!captured.is_due(checkpoint, now));
        }
    }
}
