//! SQL DDL for all AIMem tables.
//!
//! Defines the `projects`, `sessions`, `context_chunks`, `session_stats`, and
//! `schema_meta` tables plus the triggers that keep `session_stats` current.
//! All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Detected projects
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    canonical_path TEXT NOT NULL,
    type TEXT NOT NULL CHECK(type IN ('git','workspace','directory','monorepo')),
    git_root TEXT,
    git_remote TEXT,
    language TEXT,
    framework TEXT,
    workspace_markers TEXT, -- JSON array
    created_at TEXT NOT NULL,
    last_active TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active'
);

CREATE INDEX IF NOT EXISTS idx_projects_path ON projects(canonical_path);
CREATE INDEX IF NOT EXISTS idx_projects_status ON projects(status, last_active);

-- Sessions partition the chunk space
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id),
    name TEXT NOT NULL,
    kind TEXT NOT NULL CHECK(kind IN ('main','feature','debug','experiment','migration')),
    parent_session_id TEXT REFERENCES sessions(id),
    created_at TEXT NOT NULL,
    last_active TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','merged','archived')),
    working_dir TEXT,
    metadata TEXT -- JSON
);

CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_id, status);
CREATE INDEX IF NOT EXISTS idx_sessions_kind ON sessions(kind, status);

-- Embedded context chunks
CREATE TABLE IF NOT EXISTS context_chunks (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    content TEXT NOT NULL,
    summary TEXT NOT NULL DEFAULT '',
    embedding BLOB,
    relevance REAL NOT NULL DEFAULT 1.0 CHECK(relevance >= 0.0 AND relevance <= 1.0),
    importance TEXT NOT NULL CHECK(importance IN ('low','medium','high')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    ttl_deadline TEXT
);

CREATE INDEX IF NOT EXISTS idx_chunks_session ON context_chunks(session_id);
CREATE INDEX IF NOT EXISTS idx_chunks_relevance ON context_chunks(session_id, relevance DESC);
CREATE INDEX IF NOT EXISTS idx_chunks_updated ON context_chunks(session_id, updated_at DESC);
CREATE INDEX IF NOT EXISTS idx_chunks_ttl ON context_chunks(ttl_deadline);

-- Per-session aggregates, maintained by triggers
CREATE TABLE IF NOT EXISTS session_stats (
    session_id TEXT PRIMARY KEY,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    memory_usage INTEGER NOT NULL DEFAULT 0,
    average_relevance REAL NOT NULL DEFAULT 0.0,
    created_at TEXT NOT NULL,
    last_activity TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS session_stats_after_insert
AFTER INSERT ON context_chunks
BEGIN
    INSERT OR REPLACE INTO session_stats (
        session_id, chunk_count, memory_usage, average_relevance, created_at, last_activity
    )
    SELECT
        NEW.session_id,
        COUNT(*),
        SUM(LENGTH(content)),
        AVG(relevance),
        MIN(created_at),
        MAX(updated_at)
    FROM context_chunks
    WHERE session_id = NEW.session_id;
END;

CREATE TRIGGER IF NOT EXISTS session_stats_after_delete
AFTER DELETE ON context_chunks
BEGIN
    UPDATE session_stats
    SET
        chunk_count = (SELECT COUNT(*) FROM context_chunks WHERE session_id = OLD.session_id),
        memory_usage = (SELECT COALESCE(SUM(LENGTH(content)), 0) FROM context_chunks WHERE session_id = OLD.session_id),
        average_relevance = (SELECT COALESCE(AVG(relevance), 0) FROM context_chunks WHERE session_id = OLD.session_id),
        last_activity = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
    WHERE session_id = OLD.session_id;

    DELETE FROM session_stats
    WHERE session_id = OLD.session_id
    AND NOT EXISTS (SELECT 1 FROM context_chunks WHERE session_id = OLD.session_id);
END;

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"projects".to_string()));
        assert!(tables.contains(&"sessions".to_string()));
        assert!(tables.contains(&"context_chunks".to_string()));
        assert!(tables.contains(&"session_stats".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }

    #[test]
    fn stats_triggers_track_inserts_and_deletes() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO context_chunks (id, session_id, content, importance, relevance, created_at, updated_at) \
             VALUES ('c1', 's1', 'hello world', 'medium', 0.7, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let (count, usage): (i64, i64) = conn
            .query_row(
                "SELECT chunk_count, memory_usage FROM session_stats WHERE session_id = 's1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(usage, 11);

        conn.execute("DELETE FROM context_chunks WHERE id = 'c1'", [])
            .unwrap();

        // Stats row is removed once the session is empty
        let remaining: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM session_stats WHERE session_id = 's1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
