use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{CapturedItem, Checkpoint};

use super::schema::SCHEMA;
use super::{InsertOutcome, Store};

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const SELECT_COLUMNS: &str = "id, author, origin, body, captured_at, score_at_capture, \
                              score_at_1h, score_at_24h, permalink, deleted";

/// SQLite-backed [`Store`]. Each unit opens its own `Repository`.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            // Several units write to the same file concurrently.
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl Store for Repository {
    async fn insert_if_absent(&self, item: &CapturedItem) -> Result<InsertOutcome> {
        let item = item.clone();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT INTO captured_items
                           (id, author, origin, body, captured_at, score_at_capture,
                            score_at_1h, score_at_24h, permalink, deleted)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                       ON CONFLICT(id) DO NOTHING"#,
                    params![
                        item.id,
                        item.author,
                        item.origin,
                        item.body,
                        format_datetime(&item.captured_at),
                        item.score_at_capture,
                        item.score_at_1h,
                        item.score_at_24h,
                        item.permalink,
                        item.deleted,
                    ],
                )?;
                Ok(changed)
            })
            .await?;

        Ok(if changed == 0 {
            InsertOutcome::AlreadyExists
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn find_due(
        &self,
        checkpoint: Checkpoint,
        now: DateTime<Utc>,
    ) -> Result<Vec<CapturedItem>> {
        let cutoff = format_datetime(&checkpoint.cutoff(now));
        let column = score_column(checkpoint);
        let items = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM captured_items
                     WHERE captured_at < ?1 AND {column} IS NULL AND deleted = 0
                     ORDER BY captured_at"
                ))?;
                let items = stmt
                    .query_map(params![cutoff], captured_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    async fn record_score(&self, id: &str, checkpoint: Checkpoint, score: i64) -> Result<bool> {
        let id = id.to_string();
        let column = score_column(checkpoint);
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    &format!(
                        "UPDATE captured_items SET {column} = ?1
                         WHERE id = ?2 AND {column} IS NULL AND deleted = 0"
                    ),
                    params![score, id],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed > 0)
    }

    async fn mark_deleted(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE captured_items SET deleted = 1 WHERE id = ?1 AND deleted = 0",
                    params![id],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed > 0)
    }

    async fn get(&self, id: &str) -> Result<Option<CapturedItem>> {
        let id = id.to_string();
        let item = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM captured_items WHERE id = ?1"
                ))?;
                let item = stmt
                    .query_row(params![id], captured_from_row)
                    .optional()?;
                Ok(item)
            })
            .await?;
        Ok(item)
    }
}

fn score_column(checkpoint: Checkpoint) -> &'static str {
    match checkpoint {
        Checkpoint::OneHour => "score_at_1h",
        Checkpoint::OneDay => "score_at_24h",
    }
}

// Fixed-width UTC so that string comparison in SQL matches time order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn captured_from_row(row: &Row) -> rusqlite::Result<CapturedItem> {
    let captured_at: String = row.get(4)?;
    let captured_at = parse_datetime(&captured_at).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("invalid timestamp {captured_at:?}").into(),
        )
    })?;

    Ok(CapturedItem {
        id: row.get(0)?,
        author: row.get(1)?,
        origin: row.get(2)?,
        body: row.get(3)?,
        captured_at,
        score_at_capture: row.get(5)?,
        score_at_1h: row.get(6)?,
        score_at_24h: row.get(7)?,
        permalink: row.get(8)?,
        deleted: row.get::<_, i64>(9)? != 0,
    })
}
