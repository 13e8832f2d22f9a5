//! Project-tree analysis feeding `auto_store_project`.
//!
//! Walks a project directory (bounded by the ignore set), collects entry
//! points, configuration files, schema files, and architecture hints from
//! directory names, then renders prioritized context sections ready for
//! chunking and storage.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::{AimemError, Result};
use crate::memory::types::Importance;

/// TTL applied to analysis-derived chunks; stale analyses age out in a day.
pub const ANALYSIS_TTL_SECS: u64 = 86_400;

/// Areas a caller can focus the analysis on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusArea {
    Architecture,
    Api,
    Database,
    Frontend,
    Backend,
    Security,
    Testing,
    Config,
}

impl FocusArea {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Architecture => "architecture",
            Self::Api => "api",
            Self::Database => "database",
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Security => "security",
            Self::Testing => "testing",
            Self::Config => "config",
        }
    }
}

impl std::str::FromStr for FocusArea {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "architecture" => Ok(Self::Architecture),
            "api" => Ok(Self::Api),
            "database" => Ok(Self::Database),
            "frontend" => Ok(Self::Frontend),
            "backend" => Ok(Self::Backend),
            "security" => Ok(Self::Security),
            "testing" => Ok(Self::Testing),
            "config" => Ok(Self::Config),
            _ => Err(format!("unknown focus area: {s}")),
        }
    }
}

/// Facts collected in one walk of the tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectAnalysis {
    pub project_path: String,
    pub language: String,
    pub framework: String,
    pub architecture: String,
    pub entry_points: Vec<String>,
    pub config_files: Vec<String>,
    pub schema_files: Vec<String>,
    pub key_files: Vec<String>,
    pub complexity: f64,
    pub focus_areas: Vec<FocusArea>,
}

/// A rendered context section ready for storage.
#[derive(Debug, Clone)]
pub struct AnalyzedSection {
    pub content: String,
    pub summary: String,
    pub importance: Importance,
    pub relevance: f64,
}

const IGNORE_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "vendor",
    ".vscode",
    ".idea",
    "target",
    "build",
    "dist",
    ".next",
    ".nuxt",
];

const ENTRY_POINT_NAMES: &[&str] = &[
    "main.go", "main.rs", "main.py", "main.ts", "main.js", "index.js", "index.ts", "app.py",
    "app.js", "server.js", "server.py",
];

const CONFIG_NAMES: &[&str] = &[
    "config.yaml",
    "config.yml",
    "config.toml",
    "config.json",
    "settings.py",
    ".env.example",
    "docker-compose.yml",
    "dockerfile",
    "makefile",
];

pub struct ProjectAnalyzer {
    max_files: usize,
}

impl Default for ProjectAnalyzer {
    fn default() -> Self {
        Self { max_files: 5000 }
    }
}

impl ProjectAnalyzer {
    /// Analyze the tree rooted at `project_path`.
    pub fn analyze(
        &self,
        project_path: impl AsRef<Path>,
        focus_areas: Vec<FocusArea>,
    ) -> Result<ProjectAnalysis> {
        let root = project_path
            .as_ref()
            .canonicalize()
            .map_err(|e| AimemError::Validation(format!("invalid project path: {e}")))?;

        let mut analysis = ProjectAnalysis {
            project_path: root.to_string_lossy().into_owned(),
            focus_areas,
            ..Default::default()
        };

        let mut language_count: HashMap<&'static str, usize> = HashMap::new();
        let mut architecture_count: HashMap<&'static str, usize> = HashMap::new();
        let mut seen = 0usize;

        for entry in WalkDir::new(&root)
            .max_depth(8)
            .into_iter()
            .filter_entry(|e| {
                e.file_name()
                    .to_str()
                    .map(|name| !IGNORE_DIRS.contains(&name))
                    .unwrap_or(true)
            })
            .filter_map(|e| e.ok())
        {
            if seen >= self.max_files {
                break;
            }
            seen += 1;

            let name = entry.file_name().to_string_lossy().to_lowercase();

            if entry.file_type().is_dir() {
                let pattern = match () {
                    _ if name.contains("controller") || name.contains("model") => "MVC",
                    _ if name.contains("service") => "Service Layer",
                    _ if name.contains("handler") => "Handler Pattern",
                    _ if name.contains("middleware") => "Middleware Pattern",
                    _ if name.contains("component") => "Component-based",
                    _ => continue,
                };
                *architecture_count.entry(pattern).or_insert(0) += 1;
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .into_owned();

            if ENTRY_POINT_NAMES.contains(&name.as_str()) {
                analysis.entry_points.push(relative.clone());
            }
            if CONFIG_NAMES.contains(&name.as_str()) {
                analysis.config_files.push(relative.clone());
            }
            if name.ends_with(".sql") || relative.contains("migrations/") {
                analysis.schema_files.push(relative.clone());
            }

            if let Some(lang) = language_for(&name) {
                *language_count.entry(lang).or_insert(0) += 1;
                if analysis.key_files.len() < 20 {
                    analysis.key_files.push(relative);
                }
            }
        }

        analysis.language = language_count
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(lang, _)| lang.to_string())
            .unwrap_or_default();
        analysis.architecture = architecture_count
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(pattern, _)| pattern.to_string())
            .unwrap_or_default();
        analysis.complexity = complexity_score(&analysis);

        tracing::info!(
            path = %analysis.project_path,
            language = %analysis.language,
            architecture = %analysis.architecture,
            complexity = analysis.complexity,
            files_seen = seen,
            "project analysis completed"
        );

        Ok(analysis)
    }

    /// Render prioritized context sections from an analysis.
    pub fn context_sections(&self, analysis: &ProjectAnalysis) -> Vec<AnalyzedSection> {
        let mut sections = Vec::new();

        sections.push(AnalyzedSection {
            content: overview_content(analysis),
            summary: "Project overview and structure summary".to_string(),
            importance: Importance::High,
            relevance: 1.0,
        });

        if !analysis.architecture.is_empty() {
            sections.push(AnalyzedSection {
                content: architecture_content(analysis),
                summary: "Project architecture and design patterns".to_string(),
                importance: Importance::High,
                relevance: 0.9,
            });
        }

        if !analysis.config_files.is_empty() {
            sections.push(AnalyzedSection {
                content: config_content(analysis),
                summary: "Configuration and deployment files".to_string(),
                importance: Importance::Medium,
                relevance: 0.8,
            });
        }

        if !analysis.schema_files.is_empty() {
            sections.push(AnalyzedSection {
                content: database_content(analysis),
                summary: "Database schema and data models".to_string(),
                importance: Importance::Medium,
                relevance: 0.8,
            });
        }

        sections
    }
}

fn language_for(file_name: &str) -> Option<&'static str> {
    match file_name.rsplit_once('.').map(|(_, ext)| ext)? {
        "go" => Some("Go"),
        "js" | "mjs" => Some("JavaScript"),
        "ts" => Some("TypeScript"),
        "py" => Some("Python"),
        "rs" => Some("Rust"),
        "java" => Some("Java"),
        "php" => Some("PHP"),
        "rb" => Some("Ruby"),
        "cs" => Some("C#"),
        _ => None,
    }
}

fn complexity_score(analysis: &ProjectAnalysis) -> f64 {
    let file_score = (analysis.key_files.len()
        + analysis.config_files.len()
        + analysis.entry_points.len()) as f64
        * 0.1;
    let schema_score = analysis.schema_files.len() as f64 * 0.3;
    ((file_score + schema_score) / 100.0).min(1.0)
}

fn overview_content(analysis: &ProjectAnalysis) -> String {
    format!(
        "Project Analysis Summary:\n\n\
         Path: {}\n\
         Language: {}\n\
         Framework: {}\n\
         Architecture: {}\n\
         Complexity Score: {:.2}\n\n\
         Key Files ({}):\n{}\n\n\
         Configuration Files ({}):\n{}\n\n\
         Entry Points ({}):\n{}\n\n\
         Focus Areas: {}",
        analysis.project_path,
        analysis.language,
        analysis.framework,
        analysis.architecture,
        analysis.complexity,
        analysis.key_files.len(),
        analysis.key_files.join("\n"),
        analysis.config_files.len(),
        analysis.config_files.join("\n"),
        analysis.entry_points.len(),
        analysis.entry_points.join("\n"),
        analysis
            .focus_areas
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

fn architecture_content(analysis: &ProjectAnalysis) -> String {
    format!(
        "Architecture Analysis:\n\n\
         Pattern: {}\n\
         Language: {}\n\
         Framework: {}\n\n\
         Entry points: {}\n\
         Configuration management: {} config files\n\
         Complexity level: {:.2}/1.0",
        analysis.architecture,
        analysis.language,
        analysis.framework,
        analysis.entry_points.join(", "),
        analysis.config_files.len(),
        analysis.complexity,
    )
}

fn config_content(analysis: &ProjectAnalysis) -> String {
    format!(
        "Configuration Analysis:\n\n\
         Configuration files found ({}):\n{}\n\n\
         Entry points: {}",
        analysis.config_files.len(),
        analysis.config_files.join("\n"),
        analysis.entry_points.join(", "),
    )
}

fn database_content(analysis: &ProjectAnalysis) -> String {
    format!(
        "Database Analysis:\n\n\
         Schema files found ({}):\n{}\n\n\
         Language: {}\n\
         Configuration files: {}",
        analysis.schema_files.len(),
        analysis.schema_files.join("\n"),
        analysis.language,
        analysis.config_files.join(", "),
    )
}
