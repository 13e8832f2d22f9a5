//! Project detection and deterministic project identity.
//!
//! A working directory resolves to a project by walking upward for a `.git`
//! directory, then checking for workspace markers, then falling back to the
//! directory itself. The project id is the first 16 hex chars of SHA-256
//! over the most stable identifier available: git remote URL, git root path,
//! or canonical path. Detections are cached per path with a TTL.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use crate::error::{AimemError, Result};
use crate::memory::store::now_rfc3339;
use crate::memory::types::{ProjectInfo, ProjectType};

/// Filenames that mark a directory as a workspace root.
const WORKSPACE_MARKERS: &[&str] = &[
    "package.json",
    "go.mod",
    "Cargo.toml",
    "pom.xml",
    "build.gradle",
    "requirements.txt",
    "pyproject.toml",
    "Gemfile",
    "composer.json",
    "mix.exs",
];

/// Path components skipped during the language/framework census.
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

struct CachedDetection {
    project: ProjectInfo,
    cached_at: Instant,
}

pub struct ProjectDetector {
    cache: RwLock<HashMap<PathBuf, CachedDetection>>,
    cache_ttl: Duration,
}

impl Default for ProjectDetector {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

impl ProjectDetector {
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            cache_ttl,
        }
    }

    /// Detect project information for a working directory.
    pub fn detect(&self, working_dir: impl AsRef<Path>) -> Result<ProjectInfo> {
        let canonical = working_dir
            .as_ref()
            .canonicalize()
            .map_err(|e| AimemError::Validation(format!("invalid working directory: {e}")))?;

        {
            let cache = self.cache.read().expect("detector cache lock poisoned");
            if let Some(cached) = cache.get(&canonical) {
                if cached.cached_at.elapsed() < self.cache_ttl {
                    return Ok(cached.project.clone());
                }
            }
        }

        let project = detect_project(&canonical)?;

        let mut cache = self.cache.write().expect("detector cache lock poisoned");
        // Expired entries for the same path are simply overwritten
        cache.insert(
            canonical,
            CachedDetection {
                project: project.clone(),
                cached_at: Instant::now(),
            },
        );

        Ok(project)
    }

    /// Drop a cached detection, e.g. after the directory changed on disk.
    pub fn invalidate(&self, path: impl AsRef<Path>) {
        if let Ok(canonical) = path.as_ref().canonicalize() {
            let mut cache = self.cache.write().expect("detector cache lock poisoned");
            cache.remove(&canonical);
        }
    }

    pub fn clear_cache(&self) {
        let mut cache = self.cache.write().expect("detector cache lock poisoned");
        cache.clear();
    }
}

fn detect_project(canonical: &Path) -> Result<ProjectInfo> {
    let now = now_rfc3339();
    let mut project = ProjectInfo {
        id: String::new(),
        name: canonical
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string()),
        canonical_path: canonical.to_string_lossy().into_owned(),
        project_type: ProjectType::Directory,
        git_root: None,
        git_remote: None,
        language: String::new(),
        framework: String::new(),
        workspace_markers: Vec::new(),
        created_at: now.clone(),
        last_active: now,
        status: "active".to_string(),
    };

    if let Some((git_root, git_remote)) = find_git_root(canonical) {
        project.project_type = ProjectType::Git;
        project.name = git_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| project.name.clone());
        // The git root is the canonical project path
        project.canonical_path = git_root.to_string_lossy().into_owned();
        project.git_root = Some(project.canonical_path.clone());
        project.git_remote = git_remote;
    } else {
        let markers = find_workspace_markers(canonical);
        if !markers.is_empty() {
            project.project_type = ProjectType::Workspace;
            project.workspace_markers = markers;
        }
    }

    let (language, framework) = detect_language_and_framework(Path::new(&project.canonical_path));
    project.language = language;
    project.framework = framework;
    project.id = project_id(&project);

    tracing::debug!(
        path = %project.canonical_path,
        project_type = project.project_type.as_str(),
        id = %project.id,
        language = %project.language,
        "project detected"
    );

    Ok(project)
}

/// Walk from `path` upward looking for a `.git` directory. Returns the git
/// root and the `origin` remote URL if one is configured.
fn find_git_root(path: &Path) -> Option<(PathBuf, Option<String>)> {
    let mut current = path.to_path_buf();

    loop {
        let git_dir = current.join(".git");
        if git_dir.is_dir() {
            let remote = read_git_remote(&git_dir.join("config"));
            return Some((current, remote));
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Parse `.git/config` for `[remote "origin"] url = …`.
fn read_git_remote(config_path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(config_path).ok()?;
    let lines: Vec<&str> = content.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        if line.contains(r#"[remote "origin"]"#) {
            // url appears within the next few lines of the section
            for candidate in lines.iter().skip(i + 1).take(4) {
                if let Some((_, url)) = candidate.split_once("url =") {
                    return Some(url.trim().to_string());
                }
            }
            break;
        }
    }

    None
}

fn find_workspace_markers(path: &Path) -> Vec<String> {
    WORKSPACE_MARKERS
        .iter()
        .filter(|marker| path.join(marker).exists())
        .map(|marker| marker.to_string())
        .collect()
}

fn ignored(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| IGNORE_DIRS.contains(&name))
        .unwrap_or(false)
}

/// One bounded walk over the tree: the modal extension decides the language,
/// well-known config filenames decide the framework.
fn detect_language_and_framework(path: &Path) -> (String, String) {
    let mut language_count: HashMap<&'static str, usize> = HashMap::new();
    let mut frameworks: Vec<&'static str> = Vec::new();

    for entry in WalkDir::new(path)
        .max_depth(8)
        .into_iter()
        .filter_entry(|e| !ignored(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let file_name = entry.file_name().to_string_lossy().to_lowercase();

        let language = match file_name.rsplit_once('.').map(|(_, ext)| ext) {
            Some("go") => Some("Go"),
            Some("js") | Some("mjs") => Some("JavaScript"),
            Some("ts") => Some("TypeScript"),
            Some("py") => Some("Python"),
            Some("rs") => Some("Rust"),
            Some("java") => Some("Java"),
            Some("php") => Some("PHP"),
            Some("rb") => Some("Ruby"),
            Some("cs") => Some("C#"),
            _ => None,
        };
        if let Some(language) = language {
            *language_count.entry(language).or_insert(0) += 1;
        }

        let framework = match file_name.as_str() {
            "next.config.js" | "next.config.ts" => Some("Next.js"),
            "nuxt.config.js" | "nuxt.config.ts" => Some("Nuxt.js"),
            "vue.config.js" => Some("Vue.js"),
            "angular.json" => Some("Angular"),
            "svelte.config.js" => Some("Svelte"),
            "gatsby-config.js" => Some("Gatsby"),
            "remix.config.js" => Some("Remix"),
            _ => None,
        };
        if let Some(framework) = framework {
            if !frameworks.contains(&framework) {
                frameworks.push(framework);
            }
        }
    }

    let language = language_count
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(lang, _)| lang.to_string())
        .unwrap_or_default();

    (language, frameworks.join(", "))
}

/// First 16 hex chars of SHA-256 over the most stable identifier: git remote,
/// then git root, then canonical path.
pub fn project_id(project: &ProjectInfo) -> String {
    let identifier = project
        .git_remote
        .as_deref()
        .or(project.git_root.as_deref())
        .unwrap_or(&project.canonical_path);

    let hash = Sha256::digest(identifier.as_bytes());
    hash.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()[..16]
        .to_string()
}
