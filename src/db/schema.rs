pub const SCHEMA: &str = r#"
-- captured_items table
CREATE TABLE IF NOT EXISTS captured_items (
    id TEXT PRIMARY KEY NOT NULL,
    author TEXT NOT NULL,
    origin TEXT NOT NULL,
    body TEXT NOT NULL,
    captured_at TEXT NOT NULL,
    score_at_capture INTEGER NOT NULL,
    score_at_1h INTEGER,
    score_at_24h INTEGER,
    permalink TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0
);

-- one partial index per pending checkpoint keeps the update scans cheap
CREATE INDEX IF NOT EXISTS idx_captured_items_pending_1h
    ON captured_items(captured_at) WHERE score_at_1h IS NULL AND deleted = 0;
CREATE INDEX IF NOT EXISTS idx_captured_items_pending_24h
    ON captured_items(captured_at) WHERE score_at_24h IS NULL AND deleted = 0;
"#;
