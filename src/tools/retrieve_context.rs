//! `retrieve_context` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `retrieve_context` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RetrieveContextParams {
    /// Session identifier to search within.
    #[schemars(description = "Session identifier to search within")]
    pub session_id: String,

    /// Natural-language or keyword query.
    #[schemars(description = "Search query to find relevant context (natural language or keywords)")]
    pub query: String,

    /// Maximum number of chunks to return, 1–20. Defaults to 5.
    #[schemars(description = "Maximum number of context chunks to return (1-20, default 5)")]
    pub max_chunks: Option<u32>,
}
