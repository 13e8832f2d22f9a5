//! `auto_store_project` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `auto_store_project` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AutoStoreProjectParams {
    /// Session the analysis chunks are stored under.
    #[schemars(description = "Unique session identifier for context isolation")]
    pub session_id: String,

    /// Project directory to analyze.
    #[schemars(description = "Absolute or relative path to the project directory")]
    pub project_path: String,

    /// Analysis focus areas.
    #[schemars(
        description = "Areas to focus analysis on: architecture, api, database, frontend, backend, security, testing, config"
    )]
    pub focus_areas: Option<Vec<String>>,

    /// Minimum importance stored. Defaults to `"medium"`.
    #[schemars(description = "Minimum importance level for stored context: low, medium, high")]
    pub importance_threshold: Option<String>,

    /// Minimal response when true (default).
    #[schemars(description = "Run in silent mode without verbose output (default: true)")]
    pub silent: Option<bool>,
}
