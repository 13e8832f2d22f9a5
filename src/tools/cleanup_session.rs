//! `cleanup_session` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `cleanup_session` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CleanupSessionParams {
    /// Session identifier to clean up.
    #[schemars(description = "Session identifier to clean up")]
    pub session_id: String,

    /// Eviction strategy: `"ttl"`, `"lru"`, or `"relevance"`.
    #[schemars(description = "Cleanup strategy to apply: ttl, lru, relevance")]
    pub strategy: String,
}
