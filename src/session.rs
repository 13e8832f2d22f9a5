//! Session registry — deterministic IDs, resolution, and lifecycle.
//!
//! Main sessions use the stable id `{project_id[0..8]}-main`; other kinds
//! append a random 8-hex suffix. Resolution tries, in order: an existing
//! session id, a working-directory path, a legacy UUID-shaped id with a
//! legacy database on disk. Anything else is `SessionNotFound`.

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{AimemError, Result};
use crate::memory::store::now_rfc3339;
use crate::memory::types::{ProjectInfo, SessionInfo, SessionKind, SessionStatus};
use crate::project::ProjectDetector;

pub struct SessionManager {
    db: Arc<Mutex<Connection>>,
    detector: Arc<ProjectDetector>,
    cache: RwLock<HashMap<String, SessionInfo>>,
}

impl SessionManager {
    pub fn new(db: Arc<Mutex<Connection>>, detector: Arc<ProjectDetector>) -> Self {
        Self {
            db,
            detector,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Find or create the main session for the project containing
    /// `working_dir`, updating its activity timestamp.
    pub fn get_or_create_project_session(&self, working_dir: &str) -> Result<SessionInfo> {
        let project = self.detector.detect(working_dir)?;

        let conn = self.lock_db()?;
        upsert_project(&conn, &project)?;

        let mut session = match find_main_session(&conn, &project.id)? {
            Some(existing) => existing,
            None => {
                let session = new_main_session(&project, working_dir);
                insert_session(&conn, &session)?;
                tracing::info!(
                    session_id = %session.id,
                    project = %project.name,
                    "created main session"
                );
                session
            }
        };

        session.last_active = now_rfc3339();
        session.working_dir = working_dir.to_string();
        update_session_activity(&conn, &session)?;
        drop(conn);

        self.cache_put(session.clone());
        Ok(session)
    }

    /// Resolve an opaque string into a session.
    pub fn resolve_session(&self, session_or_path: &str) -> Result<SessionInfo> {
        // 1. Direct session id
        if let Ok(session) = self.get_session(session_or_path) {
            return Ok(session);
        }

        // 2. Path-like strings name a working directory
        if session_or_path.contains('/') || session_or_path.contains('\\') {
            return self.get_or_create_project_session(session_or_path);
        }

        // 3. Legacy UUID-shaped ids with a legacy database on disk
        if is_legacy_session_id(session_or_path) {
            if let Some(session) = self.migrate_legacy_session(session_or_path)? {
                return Ok(session);
            }
        }

        Err(AimemError::not_found("session", session_or_path))
    }

    /// Fetch a session by id, consulting the cache first.
    pub fn get_session(&self, session_id: &str) -> Result<SessionInfo> {
        if let Some(cached) = self
            .cache
            .read()
            .expect("session cache lock poisoned")
            .get(session_id)
        {
            return Ok(cached.clone());
        }

        let conn = self.lock_db()?;
        let session = get_session_row(&conn, session_id)?
            .ok_or_else(|| AimemError::not_found("session", session_id))?;
        drop(conn);

        self.cache_put(session.clone());
        Ok(session)
    }

    /// Create a non-main session under an existing parent.
    pub fn create_child_session(
        &self,
        parent_session_id: &str,
        kind: SessionKind,
        name: &str,
    ) -> Result<SessionInfo> {
        if kind == SessionKind::Main {
            return Err(AimemError::Validation(
                "child sessions cannot be of kind main".into(),
            ));
        }

        let parent = self.get_session(parent_session_id)?;
        let session = SessionInfo {
            id: mint_session_id(&parent.project_id, kind),
            project_id: parent.project_id.clone(),
            name: format!("{kind}-{name}"),
            kind,
            parent_session_id: Some(parent.id.clone()),
            created_at: now_rfc3339(),
            last_active: now_rfc3339(),
            status: SessionStatus::Active,
            working_dir: parent.working_dir.clone(),
            metadata: serde_json::json!({
                "parent_session": parent.id,
                "branched_from": now_rfc3339(),
            }),
        };

        let conn = self.lock_db()?;
        insert_session(&conn, &session)?;
        drop(conn);

        self.cache_put(session.clone());
        Ok(session)
    }

    /// Guarantee a session row exists for an opaque id used directly as a
    /// partition key (clients may store under ids the registry never minted).
    pub fn ensure_session(&self, session_id: &str) -> Result<()> {
        if self.get_session(session_id).is_ok() {
            return Ok(());
        }

        let now = now_rfc3339();
        let project_id = adhoc_project_id(session_id);
        let project = ProjectInfo {
            id: project_id.clone(),
            name: format!("adhoc-{session_id}"),
            canonical_path: String::new(),
            project_type: crate::memory::types::ProjectType::Directory,
            git_root: None,
            git_remote: None,
            language: String::new(),
            framework: String::new(),
            workspace_markers: Vec::new(),
            created_at: now.clone(),
            last_active: now.clone(),
            status: "active".to_string(),
        };
        let session = SessionInfo {
            id: session_id.to_string(),
            project_id,
            name: session_id.to_string(),
            kind: SessionKind::Main,
            parent_session_id: None,
            created_at: now.clone(),
            last_active: now,
            status: SessionStatus::Active,
            working_dir: String::new(),
            metadata: serde_json::json!({"ad_hoc": true}),
        };

        let conn = self.lock_db()?;
        upsert_project(&conn, &project)?;
        insert_session(&conn, &session)?;
        drop(conn);

        self.cache_put(session);
        Ok(())
    }

    /// Invalidate a cached session after an external update.
    pub fn invalidate(&self, session_id: &str) {
        self.cache
            .write()
            .expect("session cache lock poisoned")
            .remove(session_id);
    }

    /// Resolve a legacy id: a matching legacy database on disk yields a new
    /// project session for the current working directory. The legacy chunk
    /// data itself is not copied — the migration task is recorded as a no-op
    /// and the old database is left in place.
    fn migrate_legacy_session(&self, legacy_id: &str) -> Result<Option<SessionInfo>> {
        let legacy_path = legacy_database_path(legacy_id);
        if !legacy_path.exists() {
            return Ok(None);
        }

        let cwd = std::env::current_dir()
            .map_err(|e| AimemError::Internal(format!("working directory: {e}")))?;
        let session = self.get_or_create_project_session(&cwd.to_string_lossy())?;

        tracing::warn!(
            legacy_id,
            new_session = %session.id,
            legacy_db = %legacy_path.display(),
            "legacy migration scheduled"
        );

        Ok(Some(session))
    }

    fn lock_db(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| AimemError::Internal(format!("db lock poisoned: {e}")))
    }

    fn cache_put(&self, session: SessionInfo) {
        self.cache
            .write()
            .expect("session cache lock poisoned")
            .insert(session.id.clone(), session);
    }
}

// ── ID minting ───────────────────────────────────────────────────────────────

/// Stable main-session id: `{project_id[0..8]}-main`.
pub fn main_session_id(project_id: &str) -> String {
    format!("{}-main", &project_id[..8.min(project_id.len())])
}

/// Non-main sessions get a random 8-hex suffix.
pub fn mint_session_id(project_id: &str, kind: SessionKind) -> String {
    if kind == SessionKind::Main {
        return main_session_id(project_id);
    }
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        &project_id[..8.min(project_id.len())],
        kind,
        &suffix[..8]
    )
}

fn adhoc_project_id(session_id: &str) -> String {
    let hash = Sha256::digest(format!("adhoc:{session_id}").as_bytes());
    hash.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()[..16]
        .to_string()
}

/// UUID-shaped: 36 chars with dashes at positions 8, 13, 18, 23.
pub fn is_legacy_session_id(id: &str) -> bool {
    if id.len() != 36 {
        return false;
    }
    id.char_indices().all(|(i, c)| match i {
        8 | 13 | 18 | 23 => c == '-',
        _ => c.is_ascii_hexdigit(),
    })
}

/// Legacy per-session database location: `~/.aimem/aimem_<id>.db`.
pub fn legacy_database_path(session_id: &str) -> PathBuf {
    crate::config::default_aimem_dir().join(format!("aimem_{session_id}.db"))
}

fn new_main_session(project: &ProjectInfo, working_dir: &str) -> SessionInfo {
    let now = now_rfc3339();
    let mut metadata = serde_json::json!({
        "project_name": project.name,
        "project_type": project.project_type.as_str(),
        "canonical_path": project.canonical_path,
        "language": project.language,
        "framework": project.framework,
        "auto_created": true,
        "creation_method": "smart_detection",
        "workspace_markers": project.workspace_markers,
    });
    if let Some(git_root) = &project.git_root {
        metadata["git_root"] = serde_json::json!(git_root);
    }
    if let Some(git_remote) = &project.git_remote {
        metadata["git_remote"] = serde_json::json!(git_remote);
    }

    SessionInfo {
        id: main_session_id(&project.id),
        project_id: project.id.clone(),
        name: format!("{}-main", project.name),
        kind: SessionKind::Main,
        parent_session_id: None,
        created_at: now.clone(),
        last_active: now,
        status: SessionStatus::Active,
        working_dir: working_dir.to_string(),
        metadata,
    }
}

// ── SQL ──────────────────────────────────────────────────────────────────────

fn upsert_project(conn: &Connection, project: &ProjectInfo) -> Result<()> {
    let markers = serde_json::to_string(&project.workspace_markers)?;
    conn.execute(
        "INSERT OR REPLACE INTO projects \
         (id, name, canonical_path, type, git_root, git_remote, language, framework, \
          workspace_markers, created_at, last_active, status) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            project.id,
            project.name,
            project.canonical_path,
            project.project_type.as_str(),
            project.git_root,
            project.git_remote,
            project.language,
            project.framework,
            markers,
            project.created_at,
            project.last_active,
            project.status,
        ],
    )?;
    Ok(())
}

fn insert_session(conn: &Connection, session: &SessionInfo) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO sessions \
         (id, project_id, name, kind, parent_session_id, created_at, last_active, \
          status, working_dir, metadata) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            session.id,
            session.project_id,
            session.name,
            session.kind.as_str(),
            session.parent_session_id,
            session.created_at,
            session.last_active,
            session.status.as_str(),
            session.working_dir,
            session.metadata.to_string(),
        ],
    )?;
    Ok(())
}

fn update_session_activity(conn: &Connection, session: &SessionInfo) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET last_active = ?1, working_dir = ?2 WHERE id = ?3",
        params![session.last_active, session.working_dir, session.id],
    )?;
    Ok(())
}

fn get_session_row(conn: &Connection, session_id: &str) -> Result<Option<SessionInfo>> {
    let row = conn
        .query_row(
            "SELECT id, project_id, name, kind, parent_session_id, created_at, \
             last_active, status, working_dir, metadata \
             FROM sessions WHERE id = ?1",
            params![session_id],
            row_to_session,
        )
        .optional()?;
    Ok(row)
}

fn find_main_session(conn: &Connection, project_id: &str) -> Result<Option<SessionInfo>> {
    let row = conn
        .query_row(
            "SELECT id, project_id, name, kind, parent_session_id, created_at, \
             last_active, status, working_dir, metadata \
             FROM sessions \
             WHERE project_id = ?1 AND kind = 'main' AND status = 'active' \
             ORDER BY last_active DESC LIMIT 1",
            params![project_id],
            row_to_session,
        )
        .optional()?;
    Ok(row)
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionInfo> {
    let kind: String = row.get(3)?;
    let status: String = row.get(7)?;
    let metadata: Option<String> = row.get(9)?;

    Ok(SessionInfo {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        kind: kind.parse().unwrap_or(SessionKind::Main),
        parent_session_id: row.get(4)?,
        created_at: row.get(5)?,
        last_active: row.get(6)?,
        status: status.parse().unwrap_or(SessionStatus::Active),
        working_dir: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        metadata: metadata
            .and_then(|m| serde_json::from_str(&m).ok())
            .unwrap_or_else(|| serde_json::json!({})),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn manager() -> SessionManager {
        let conn = db::open_memory_database().unwrap();
        SessionManager::new(
            Arc::new(Mutex::new(conn)),
            Arc::new(ProjectDetector::default()),
        )
    }

    #[test]
    fn main_session_id_is_stable() {
        assert_eq!(main_session_id("abcdef0123456789"), "abcdef01-main");
    }

    #[test]
    fn minted_feature_ids_are_unique() {
        let a = mint_session_id("abcdef0123456789", SessionKind::Feature);
        let b = mint_session_id("abcdef0123456789", SessionKind::Feature);
        assert_ne!(a, b);
        assert!(a.starts_with("abcdef01-feature-"));
        assert_eq!(a.len(), "abcdef01-feature-".len() + 8);
    }

    #[test]
    fn same_directory_resolves_to_same_session() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let m = manager();

        let first = m
            .get_or_create_project_session(&dir.path().to_string_lossy())
            .unwrap();
        let second = m
            .get_or_create_project_session(&dir.path().to_string_lossy())
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.last_active >= first.last_active);
        assert_eq!(first.kind, SessionKind::Main);
    }

    #[test]
    fn resolve_existing_session_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager();
        let created = m
            .get_or_create_project_session(&dir.path().to_string_lossy())
            .unwrap();

        let resolved = m.resolve_session(&created.id).unwrap();
        assert_eq!(resolved.id, created.id);
    }

    #[test]
    fn resolve_path_creates_project_session() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager();

        let resolved = m.resolve_session(&dir.path().to_string_lossy()).unwrap();
        assert_eq!(resolved.kind, SessionKind::Main);
        assert!(resolved.id.ends_with("-main"));
    }

    #[test]
    fn unknown_opaque_id_is_not_found() {
        let m = manager();
        let err = m.resolve_session("no-such-session").unwrap_err();
        assert!(matches!(err, AimemError::NotFound { .. }));
    }

    #[test]
    fn legacy_id_shape_detection() {
        assert!(is_legacy_session_id(
            "6ba7b810-9dad-11d1-80b4-00c04fd430c8"
        ));
        assert!(!is_legacy_session_id("abcdef01-main"));
        assert!(!is_legacy_session_id("short"));
        assert!(!is_legacy_session_id(
            "6ba7b810-9dad-11d1-80b4-00c04fd430cZ" // non-hex
        ));
    }

    #[test]
    fn legacy_id_without_legacy_db_is_not_found() {
        let m = manager();
        let err = m
            .resolve_session("6ba7b810-9dad-11d1-80b4-00c04fd4dead")
            .unwrap_err();
        assert!(matches!(err, AimemError::NotFound { .. }));
    }

    #[test]
    fn child_session_links_to_parent() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager();
        let parent = m
            .get_or_create_project_session(&dir.path().to_string_lossy())
            .unwrap();

        let child = m
            .create_child_session(&parent.id, SessionKind::Debug, "login-500")
            .unwrap();

        assert_eq!(child.parent_session_id.as_deref(), Some(parent.id.as_str()));
        assert_eq!(child.project_id, parent.project_id);
        assert!(child.id.contains("-debug-"));

        let reloaded = m.get_session(&child.id).unwrap();
        assert_eq!(reloaded.kind, SessionKind::Debug);
    }

    #[test]
    fn child_session_cannot_be_main() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager();
        let parent = m
            .get_or_create_project_session(&dir.path().to_string_lossy())
            .unwrap();

        let err = m
            .create_child_session(&parent.id, SessionKind::Main, "nope")
            .unwrap_err();
        assert!(matches!(err, AimemError::Validation(_)));
    }

    #[test]
    fn ensure_session_registers_opaque_ids() {
        let m = manager();
        assert!(m.get_session("proj-a-main").is_err());

        m.ensure_session("proj-a-main").unwrap();
        let session = m.get_session("proj-a-main").unwrap();
        assert_eq!(session.id, "proj-a-main");

        // Idempotent
        m.ensure_session("proj-a-main").unwrap();
    }

    #[test]
    fn session_metadata_captures_project_facts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        let m = manager();

        let session = m
            .get_or_create_project_session(&dir.path().to_string_lossy())
            .unwrap();
        assert_eq!(session.metadata["auto_created"], true);
        assert_eq!(session.metadata["project_type"], "workspace");
    }
}
