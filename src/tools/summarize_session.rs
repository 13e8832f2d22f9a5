//! `summarize_session` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `summarize_session` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SummarizeSessionParams {
    /// Session identifier to analyze.
    #[schemars(description = "Session identifier to analyze")]
    pub session_id: String,
}
