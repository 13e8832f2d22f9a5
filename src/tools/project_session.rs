//! `get_or_create_project_session` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `get_or_create_project_session` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ProjectSessionParams {
    /// Working directory the session should be derived from.
    #[schemars(description = "Working directory to detect the project from")]
    pub working_dir: String,
}
