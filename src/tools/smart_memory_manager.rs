//! `smart_memory_manager` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `smart_memory_manager` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SmartMemoryManagerParams {
    /// Session identifier to manage.
    #[schemars(description = "Session identifier to manage")]
    pub session_id: String,

    /// Current development phase.
    #[schemars(
        description = "Current phase of the development session: analysis, development, testing, deployment"
    )]
    pub session_phase: String,

    /// Sweep aggressiveness.
    #[schemars(description = "Memory management strategy: aggressive, balanced, conservative")]
    pub memory_strategy: String,

    /// Keep high-importance chunks regardless of strategy. Defaults to true.
    #[schemars(description = "Whether to preserve high-importance context regardless of strategy")]
    pub preserve_important: Option<bool>,
}
