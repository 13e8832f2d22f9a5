//! `store_context` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `store_context` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StoreContextParams {
    /// Session identifier the content belongs to.
    #[schemars(description = "Unique session identifier for context isolation")]
    pub session_id: String,

    /// The conversation content to store.
    #[schemars(description = "The conversation content to store (text, code, or structured data)")]
    pub content: String,

    /// Importance level: `"low"`, `"medium"`, or `"high"`.
    #[schemars(description = "Importance level affecting retention priority: low, medium, high")]
    pub importance: String,

    /// TTL in seconds for the stored chunks. Defaults to the configured TTL.
    #[schemars(description = "Optional TTL in seconds; 0 or absent uses the configured default")]
    pub ttl_secs: Option<u64>,

    /// Minimal response when true (default).
    #[schemars(description = "Run in silent mode without verbose output (default: true)")]
    pub silent: Option<bool>,
}
