//! Core type definitions for the memory engine.
//!
//! Defines [`ContextChunk`] (the central stored entity), the enum vocabulary
//! used across tools (importance, cleanup strategies, task types, session
//! phases), and the session/project records they reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Enums ────────────────────────────────────────────────────────────────────

/// Author-declared priority, immutable after insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Medium,
    High,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Seed relevance assigned at insert.
    pub fn initial_relevance(&self) -> f64 {
        match self {
            Self::High => 0.9,
            Self::Medium => 0.7,
            Self::Low => 0.5,
        }
    }

    /// Weight used in the combined retrieval score.
    pub fn score_weight(&self) -> f64 {
        match self {
            Self::High => 1.0,
            Self::Medium => 0.7,
            Self::Low => 0.3,
        }
    }

    /// Ordering rank: low < medium < high.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Importance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("importance must be one of: low, medium, high (got {s})")),
        }
    }
}

/// Eviction strategy selected by `cleanup_session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupStrategy {
    Ttl,
    Lru,
    Relevance,
}

impl CleanupStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ttl => "ttl",
            Self::Lru => "lru",
            Self::Relevance => "relevance",
        }
    }
}

impl std::str::FromStr for CleanupStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ttl" => Ok(Self::Ttl),
            "lru" => Ok(Self::Lru),
            "relevance" => Ok(Self::Relevance),
            _ => Err(format!("strategy must be one of: ttl, lru, relevance (got {s})")),
        }
    }
}

/// Label on a retrieval request selecting a keyword-boost table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Analysis,
    Development,
    Debugging,
    Refactoring,
    Testing,
    Deployment,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Development => "development",
            Self::Debugging => "debugging",
            Self::Refactoring => "refactoring",
            Self::Testing => "testing",
            Self::Deployment => "deployment",
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analysis" => Ok(Self::Analysis),
            "development" => Ok(Self::Development),
            "debugging" => Ok(Self::Debugging),
            "refactoring" => Ok(Self::Refactoring),
            "testing" => Ok(Self::Testing),
            "deployment" => Ok(Self::Deployment),
            _ => Err(format!(
                "task_type must be one of: analysis, development, debugging, \
                 refactoring, testing, deployment (got {s})"
            )),
        }
    }
}

/// Development phase driving the smart memory manager's cleanup ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Analysis,
    Development,
    Testing,
    Deployment,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Deployment => "deployment",
        }
    }
}

impl std::str::FromStr for SessionPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analysis" => Ok(Self::Analysis),
            "development" => Ok(Self::Development),
            "testing" => Ok(Self::Testing),
            "deployment" => Ok(Self::Deployment),
            _ => Err(format!(
                "session_phase must be one of: analysis, development, testing, \
                 deployment (got {s})"
            )),
        }
    }
}

/// How aggressively the smart memory manager sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStrategy {
    Aggressive,
    Balanced,
    Conservative,
}

impl MemoryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aggressive => "aggressive",
            Self::Balanced => "balanced",
            Self::Conservative => "conservative",
        }
    }
}

impl std::str::FromStr for MemoryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aggressive" => Ok(Self::Aggressive),
            "balanced" => Ok(Self::Balanced),
            "conservative" => Ok(Self::Conservative),
            _ => Err(format!(
                "memory_strategy must be one of: aggressive, balanced, conservative (got {s})"
            )),
        }
    }
}

/// Purpose of a session within its project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Main,
    Feature,
    Debug,
    Experiment,
    Migration,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Feature => "feature",
            Self::Debug => "debug",
            Self::Experiment => "experiment",
            Self::Migration => "migration",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(Self::Main),
            "feature" => Ok(Self::Feature),
            "debug" => Ok(Self::Debug),
            "experiment" => Ok(Self::Experiment),
            "migration" => Ok(Self::Migration),
            _ => Err(format!("unknown session kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Merged,
    Archived,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Merged => "merged",
            Self::Archived => "archived",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "merged" => Ok(Self::Merged),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("unknown session status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Git,
    Workspace,
    Directory,
    Monorepo,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Workspace => "workspace",
            Self::Directory => "directory",
            Self::Monorepo => "monorepo",
        }
    }
}

impl std::str::FromStr for ProjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git" => Ok(Self::Git),
            "workspace" => Ok(Self::Workspace),
            "directory" => Ok(Self::Directory),
            "monorepo" => Ok(Self::Monorepo),
            _ => Err(format!("unknown project type: {s}")),
        }
    }
}

// ── Records ──────────────────────────────────────────────────────────────────

/// A bounded piece of stored text with embedding, summary, and retention
/// metadata. The central entity of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextChunk {
    /// Opaque unique identifier (UUID v7, time-sortable).
    pub id: String,
    /// Partition key; every chunk belongs to exactly one session.
    pub session_id: String,
    /// The stored text.
    pub content: String,
    /// Short derivative text.
    pub summary: String,
    /// Unit-length vector, absent if embedding failed. Such chunks are
    /// retrievable by id but skipped in similarity scans. Not serialized
    /// into responses.
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    /// Dynamic score in `[0, 1]`, seeded from importance and updated on
    /// retrieval to the last query's combined score.
    pub relevance: f64,
    /// Author-declared priority, immutable after insert.
    pub importance: Importance,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-modification timestamp.
    pub updated_at: String,
    /// Absolute expiry timestamp, or `None` for no TTL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_deadline: Option<String>,
}

impl ContextChunk {
    /// Age in hours since creation; 0 if the timestamp does not parse.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        DateTime::parse_from_rfc3339(&self.created_at)
            .map(|created| {
                let minutes = (now - created.with_timezone(&Utc)).num_minutes();
                (minutes as f64 / 60.0).max(0.0)
            })
            .unwrap_or(0.0)
    }
}

/// Per-session aggregate statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub chunk_count: i64,
    pub total_content_bytes: i64,
    pub average_relevance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<String>,
}

/// A session ties chunks to a project and a purpose.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub kind: SessionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<String>,
    pub created_at: String,
    pub last_active: String,
    pub status: SessionStatus,
    pub working_dir: String,
    pub metadata: serde_json::Value,
}

/// A detected project identifying a directory tree.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectInfo {
    /// First 16 hex chars of SHA-256 over the project's stable identifier.
    pub id: String,
    pub name: String,
    pub canonical_path: String,
    pub project_type: ProjectType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_remote: Option<String>,
    pub language: String,
    pub framework: String,
    pub workspace_markers: Vec<String>,
    pub created_at: String,
    pub last_active: String,
    pub status: String,
}

/// An edge recorded during auto-expansion.
#[derive(Debug, Clone, Serialize)]
pub struct ContextRelationship {
    pub chunk_id: String,
    pub related_chunk_id: String,
    pub strength: f64,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importance_round_trips_through_strings() {
        for s in ["low", "medium", "high"] {
            let parsed: Importance = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!("critical".parse::<Importance>().is_err());
    }

    #[test]
    fn importance_ordering_and_weights() {
        assert!(Importance::Low.rank() < Importance::Medium.rank());
        assert!(Importance::Medium.rank() < Importance::High.rank());
        assert_eq!(Importance::High.score_weight(), 1.0);
        assert_eq!(Importance::Medium.initial_relevance(), 0.7);
    }

    #[test]
    fn task_type_parses_all_variants() {
        for s in [
            "analysis",
            "development",
            "debugging",
            "refactoring",
            "testing",
            "deployment",
        ] {
            assert!(s.parse::<TaskType>().is_ok(), "failed for {s}");
        }
        assert!("gardening".parse::<TaskType>().is_err());
    }

    #[test]
    fn chunk_age_in_hours() {
        let now = Utc::now();
        let chunk = ContextChunk {
            id: "c".into(),
            session_id: "s".into(),
            content: "x".into(),
            summary: String::new(),
            embedding: None,
            relevance: 0.5,
            importance: Importance::Medium,
            created_at: (now - chrono::Duration::hours(12)).to_rfc3339(),
            updated_at: now.to_rfc3339(),
            ttl_deadline: None,
        };
        let age = chunk.age_hours(now);
        assert!((age - 12.0).abs() < 0.1, "age was {age}");
    }

    #[test]
    fn chunk_age_tolerates_bad_timestamp() {
        let chunk = ContextChunk {
            id: "c".into(),
            session_id: "s".into(),
            content: "x".into(),
            summary: String::new(),
            embedding: None,
            relevance: 0.5,
            importance: Importance::Low,
            created_at: "not-a-timestamp".into(),
            updated_at: "also-not".into(),
            ttl_deadline: None,
        };
        assert_eq!(chunk.age_hours(Utc::now()), 0.0);
    }

    #[test]
    fn chunk_serialization_omits_embedding() {
        let chunk = ContextChunk {
            id: "c".into(),
            session_id: "s".into(),
            content: "text".into(),
            summary: "sum".into(),
            embedding: Some(vec![0.1; 384]),
            relevance: 0.8,
            importance: Importance::High,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
            ttl_deadline: None,
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(!json.contains("embedding"));
        assert!(!json.contains("ttl_deadline"));
        assert!(json.contains("\"importance\":\"high\""));
    }
}
