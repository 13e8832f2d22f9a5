pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Schema version this binary expects. Bump together with [`MIGRATIONS`].
pub const SCHEMA_VERSION: u32 = 3;

/// Forward-only migrations, applied in order above the base schema (v1).
/// Each entry is (target version, what it changes).
const MIGRATIONS: &[(u32, fn(&Connection) -> rusqlite::Result<()>)] = &[
    // v2: record the embedding model and its dimensions so a model swap is
    // detected at startup instead of silently mixing vector spaces.
    (2, |conn| {
        conn.execute_batch(
            "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('embedding_model', 'hash-384');
             INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('embedding_dimensions', '384');",
        )
    }),
    // v3: eviction sweeps filter on importance; give them an index.
    (3, |conn| {
        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_chunks_importance \
             ON context_chunks(session_id, importance);",
        )
    }),
];

/// Open (or create) the AIMem database at the given path with schema
/// initialized and migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path).with_context(|| {
        format!(
            "failed to open database at {}. If the file is corrupt, \
             restore from a backup or run `aimem reset` to start fresh.",
            path.display()
        )
    })?;

    // WAL for concurrent readers while a writer is active
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    // Wait up to 5 seconds for locks instead of failing immediately
    conn.pragma_update(None, "busy_timeout", "5000")?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    apply_migrations(&conn).context("failed to apply migrations")?;

    let integrity: String = conn.pragma_query_value(None, "quick_check", |row| row.get(0))?;
    if integrity != "ok" {
        anyhow::bail!("database integrity check failed: {integrity}");
    }

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Current schema version recorded in `schema_meta`.
pub fn schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

/// Apply any pending entries from [`MIGRATIONS`]. Databases already at
/// [`SCHEMA_VERSION`] are untouched; unknown newer versions are left alone
/// so an old binary never rewrites a newer database.
pub fn apply_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let current = schema_version(conn)?;
    tracing::debug!(current, target = SCHEMA_VERSION, "checking schema version");

    for (version, migrate) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        tracing::info!(to = version, "applying migration");
        migrate(conn)?;
        conn.execute(
            "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
            [version.to_string()],
        )?;
    }

    Ok(())
}

/// Get the stored embedding model identifier, if any.
pub fn get_embedding_model(conn: &Connection) -> rusqlite::Result<Option<String>> {
    match conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'embedding_model'",
        [],
        |row| row.get::<_, String>(0),
    ) {
        Ok(val) => Ok(Some(val)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Set the stored embedding model identifier.
pub fn set_embedding_model(conn: &Connection, model: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('embedding_model', ?1)",
        [model],
    )?;
    Ok(())
}

/// Result of a full database health check.
pub struct HealthReport {
    pub schema_version: u32,
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub chunk_count: i64,
    pub session_count: i64,
    pub project_count: i64,
}

/// Run a comprehensive health check on the database.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let schema_version = schema_version(conn).context("failed to read schema version")?;

    let integrity_details: String = conn
        .pragma_query_value(None, "integrity_check", |row| row.get(0))
        .context("failed to run integrity check")?;
    let integrity_ok = integrity_details == "ok";

    let chunk_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM context_chunks", [], |row| row.get(0))
        .unwrap_or(0);

    let session_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
        .unwrap_or(0);

    let project_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(HealthReport {
        schema_version,
        integrity_ok,
        integrity_details,
        chunk_count,
        session_count,
        project_count,
    })
}

/// Open an in-memory database for testing.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    apply_migrations(&conn).context("failed to apply migrations")?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        schema::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn fresh_schema_starts_at_version_1() {
        let conn = fresh_db();
        assert_eq!(schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn migrations_reach_the_current_version() {
        let conn = fresh_db();
        apply_migrations(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = fresh_db();
        apply_migrations(&conn).unwrap();
        apply_migrations(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn v2_records_model_and_dimensions() {
        let conn = fresh_db();
        assert!(get_embedding_model(&conn).unwrap().is_none());

        apply_migrations(&conn).unwrap();

        assert_eq!(
            get_embedding_model(&conn).unwrap(),
            Some("hash-384".to_string())
        );
        let dims: String = conn
            .query_row(
                "SELECT value FROM schema_meta WHERE key = 'embedding_dimensions'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(dims, "384");
    }

    #[test]
    fn v3_adds_importance_index() {
        let conn = fresh_db();
        apply_migrations(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master \
                 WHERE type = 'index' AND name = 'idx_chunks_importance'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn newer_database_is_left_alone() {
        let conn = fresh_db();
        conn.execute(
            "UPDATE schema_meta SET value = '99' WHERE key = 'schema_version'",
            [],
        )
        .unwrap();

        apply_migrations(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 99);
    }

    #[test]
    fn set_and_get_embedding_model() {
        let conn = fresh_db();
        apply_migrations(&conn).unwrap();

        set_embedding_model(&conn, "minilm-384").unwrap();
        assert_eq!(
            get_embedding_model(&conn).unwrap(),
            Some("minilm-384".to_string())
        );
    }

    #[test]
    fn health_check_reports_counts() {
        let conn = open_memory_database().unwrap();
        let report = check_database_health(&conn).unwrap();
        assert_eq!(report.schema_version, SCHEMA_VERSION);
        assert!(report.integrity_ok);
        assert_eq!(report.chunk_count, 0);
    }
}
