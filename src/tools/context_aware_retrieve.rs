//! `context_aware_retrieve` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `context_aware_retrieve` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ContextAwareRetrieveParams {
    /// Session identifier to search within.
    #[schemars(description = "Session identifier to search within")]
    pub session_id: String,

    /// Description of the task being performed; becomes the query.
    #[schemars(description = "Description of the current task being performed")]
    pub current_task: String,

    /// Task type selecting the keyword-boost table.
    #[schemars(
        description = "Type of task: analysis, development, debugging, refactoring, testing, deployment"
    )]
    pub task_type: String,

    /// Expand results with keyword-linked neighbors.
    #[schemars(description = "Whether to automatically expand with related context")]
    pub auto_expand: Option<bool>,

    /// Maximum primary chunks, 1–50. Defaults to 5.
    #[schemars(description = "Maximum number of context chunks to return (1-50, default 5)")]
    pub max_chunks: Option<u32>,

    /// Relationship exploration depth, 1–5. Defaults to 2.
    #[schemars(description = "Depth of context relationships to explore (1-5, default 2)")]
    pub context_depth: Option<u32>,

    /// Response token budget, 1000–24000. Defaults to the configured limit.
    #[schemars(description = "Maximum estimated tokens in the response (1000-24000)")]
    pub max_response_tokens: Option<u32>,

    /// 1-indexed page of primary results.
    #[schemars(description = "Page number for paginated primary results (>= 1)")]
    pub page: Option<u32>,

    /// Override the configured pagination setting.
    #[schemars(description = "Enable pagination of primary results")]
    pub enable_pagination: Option<bool>,
}
