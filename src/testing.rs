//! Test doubles for the source and the store.
//!
//! `MockSource` replays scripted responses; `MemoryStore` keeps records in a
//! map with the same conditional-write rules as the SQLite repository.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;

use crate::db::{InsertOutcome, Store};
use crate::error::{AppError, Result};
use crate::models::{CapturedItem, Checkpoint, Item};
use crate::source::{ContentSource, Fetched, Lookup};

pub fn permalink(id: &str) -> String {
    format!("/r/AskReddit/comments/t3post/some_title/{id}/")
}

pub fn item(
    id: &str,
    author: Option<&str>,
    body: Option<&str>,
    age: Duration,
    score: i64,
) -> Item {
    Item {
        id: id.to_string(),
        author: author.map(str::to_string),
        origin: "AskReddit".to_string(),
        body: body.map(str::to_string),
        created_at: Utc::now() - age,
        score,
        permalink: permalink(id),
    }
}

pub fn captured(id: &str, age: Duration) -> CapturedItem {
    let seen = item(
        id,
        Some("alice"),
        Some("did you just assume my gender"),
        age,
        1,
    );
    CapturedItem::from_item(&seen).expect("author and body are set")
}

type Scripted<T> = std::result::Result<Fetched<T>, String>;

#[derive(Default)]
pub struct MockSource {
    recent: Mutex<VecDeque<Scripted<Vec<Item>>>>,
    lookups: Mutex<HashMap<String, VecDeque<Fetched<Lookup>>>>,
    recent_calls: Mutex<Vec<usize>>,
    lookup_calls: AtomicUsize,
    drained: Option<CancellationToken>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_recent(self, response: Fetched<Vec<Item>>) -> Self {
        self.recent.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail_recent(self, message: &str) -> Self {
        self.recent.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    pub fn on_lookup(self, permalink: &str, response: Fetched<Lookup>) -> Self {
        self.lookups
            .lock()
            .unwrap()
            .entry(permalink.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Cancels `token` once the scripted `fetch_recent` responses run out.
    pub fn cancel_when_drained(mut self, token: CancellationToken) -> Self {
        self.drained = Some(token);
        self
    }

    pub fn recent_calls(&self) -> Vec<usize> {
        self.recent_calls.lock().unwrap().clone()
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for MockSource {
    async fn fetch_recent(&self, limit: usize) -> Result<Fetched<Vec<Item>>> {
        self.recent_calls.lock().unwrap().push(limit);
        match self.recent.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(AppError::Source(message)),
            None => {
                if let Some(token) = &self.drained {
                    token.cancel();
                }
                Ok(Fetched::Ready(Vec::new()))
            }
        }
    }

    async fn fetch_by_permalink(&self, permalink: &str) -> Result<Fetched<Lookup>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.lookups
            .lock()
            .unwrap()
            .get_mut(permalink)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| AppError::Source(format!("no scripted response for {permalink}")))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, CapturedItem>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item: CapturedItem) {
        self.records.lock().unwrap().insert(item.id.clone(), item);
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.lock().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_if_absent(&self, item: &CapturedItem) -> Result<InsertOutcome> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&item.id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        records.insert(item.id.clone(), item.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn find_due(
        &self,
        checkpoint: Checkpoint,
        now: DateTime<Utc>,
    ) -> Result<Vec<CapturedItem>> {
        let mut due: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.is_due(checkpoint, now))
            .cloned()
            .collect();
        due.sort_by_key(|r| r.captured_at);
        Ok(due)
    }

    async fn record_score(&self, id: &str, checkpoint: Checkpoint, score: i64) -> Result<bool> {
        let mut records = self.records.lock().unwrap();
        let Some(record) = records.get_mut(id) else {
            return Ok(false);
        };
        if record.deleted || record.score_at(checkpoint).is_some() {
            return Ok(false);
        }
        match checkpoint {
            Checkpoint::OneHour => record.score_at_1h = Some(score),
            Checkpoint::OneDay => record.score_at_24h = Some(score),
        }
        Ok(true)
    }

    async fn mark_deleted(&self, id: &str) -> Result<bool> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(id) {
            Some(record) if !record.deleted => {
                record.deleted = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<CapturedItem>> {
        Ok(self.records.lock().unwrap().get(id).cloned())
    }
}
