pub mod auto_store_project;
pub mod cleanup_session;
pub mod context_aware_retrieve;
pub mod project_session;
pub mod retrieve_context;
pub mod smart_memory_manager;
pub mod store_context;
pub mod summarize_session;

use rmcp::handler::server::tool::{Parameters, ToolRouter};
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use rusqlite::Connection;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use auto_store_project::AutoStoreProjectParams;
use cleanup_session::CleanupSessionParams;
use context_aware_retrieve::ContextAwareRetrieveParams;
use project_session::ProjectSessionParams;
use retrieve_context::RetrieveContextParams;
use smart_memory_manager::SmartMemoryManagerParams;
use store_context::StoreContextParams;
use summarize_session::SummarizeSessionParams;

use crate::analyzer::{FocusArea, ProjectAnalyzer, ANALYSIS_TTL_SECS};
use crate::chunker::Chunker;
use crate::config::AimemConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::AimemError;
use crate::memory::budget::{BudgetConfig, ResponseLimiter};
use crate::memory::types::{
    CleanupStrategy, ContextChunk, Importance, MemoryStrategy, SessionPhase, TaskType,
};
use crate::memory::{cleanup, retrieve, store};
use crate::metrics::PerformanceMonitor;
use crate::session::SessionManager;
use crate::summarizer::Summarizer;

// ── Result payloads ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct StoreContextResult {
    chunk_id: String,
    chunk_ids: Vec<String>,
    chunks_stored: usize,
    chunks_failed: usize,
    bytes_stored: usize,
}

#[derive(Debug, Serialize)]
struct AutoStoreProjectResult {
    chunks_stored: usize,
    chunk_ids: Vec<String>,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<crate::analyzer::ProjectAnalysis>,
}

/// The AIMem MCP tool handler. Holds shared state (db connection, embedding
/// provider, session registry, metrics) and exposes all tools via the
/// `#[tool_router]` macro.
#[derive(Clone)]
pub struct AimemTools {
    tool_router: ToolRouter<Self>,
    db: Arc<Mutex<Connection>>,
    embedding: Arc<dyn EmbeddingProvider>,
    sessions: Arc<SessionManager>,
    monitor: Arc<PerformanceMonitor>,
    config: Arc<AimemConfig>,
}

#[tool_router]
impl AimemTools {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        embedding: Arc<dyn EmbeddingProvider>,
        sessions: Arc<SessionManager>,
        monitor: Arc<PerformanceMonitor>,
        config: Arc<AimemConfig>,
    ) -> Self {
        Self {
            tool_router: Self::tool_router(),
            db,
            embedding,
            sessions,
            monitor,
            config,
        }
    }

    /// Chunk, embed, summarize, and store conversation context.
    #[tool(
        description = "Store conversation context. The content is chunked, embedded, and summarized; returns the new chunk ids."
    )]
    async fn store_context(
        &self,
        Parameters(params): Parameters<StoreContextParams>,
    ) -> Result<String, String> {
        let importance: Importance = params.importance.parse()?;
        if params.content.is_empty() {
            return Err("content must not be empty".into());
        }

        let timer = self.monitor.start_request(&params.session_id, "store_context");
        tracing::info!(
            session_id = %params.session_id,
            content_len = params.content.len(),
            importance = %importance,
            "store_context called"
        );

        let db = Arc::clone(&self.db);
        let embedding = Arc::clone(&self.embedding);
        let sessions = Arc::clone(&self.sessions);
        let config = Arc::clone(&self.config);
        let session_id = params.session_id.clone();
        let content = params.content;
        let ttl_secs = params.ttl_secs.unwrap_or(config.memory.ttl_default_secs);

        let result = tokio::task::spawn_blocking(move || {
            sessions.ensure_session(&session_id)?;

            let chunker = Chunker::from_config(&config);
            let summarizer = Summarizer::from_config(&config);
            let pieces = chunker.chunk(&content, config.memory.chunk_size)?;

            let mut chunk_ids = Vec::new();
            let mut failed = 0usize;
            let mut bytes_stored = 0usize;

            for piece in &pieces {
                // Summary and embedding failures degrade per chunk; the raw
                // content is still stored.
                let summary = match summarizer
                    .summarize(&piece.content, config.summary_budget())
                {
                    Ok(summary) => summary,
                    Err(err) => {
                        tracing::warn!(error = %err, "summarization failed, storing raw chunk");
                        String::new()
                    }
                };
                let vector = match embedding.embed(&piece.content) {
                    Ok(v) => Some(v),
                    Err(err) => {
                        tracing::warn!(error = %err, "embedding failed, chunk stored without vector");
                        None
                    }
                };

                let now = store::now_rfc3339();
                let chunk = ContextChunk {
                    id: uuid::Uuid::now_v7().to_string(),
                    session_id: session_id.clone(),
                    content: piece.content.clone(),
                    summary,
                    embedding: vector,
                    relevance: importance.initial_relevance(),
                    importance,
                    created_at: now.clone(),
                    updated_at: now,
                    ttl_deadline: None,
                };

                let conn = db
                    .lock()
                    .map_err(|e| AimemError::Internal(format!("db lock poisoned: {e}")))?;
                match store::put_chunk(&conn, &chunk, ttl_secs) {
                    Ok(()) => {
                        bytes_stored += chunk.content.len();
                        chunk_ids.push(chunk.id);
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to store chunk");
                        failed += 1;
                    }
                }
            }

            if chunk_ids.is_empty() && !pieces.is_empty() {
                return Err(AimemError::Storage("no chunks could be stored".into()));
            }

            Ok::<_, AimemError>(StoreContextResult {
                chunk_id: chunk_ids.first().cloned().unwrap_or_default(),
                chunks_stored: chunk_ids.len(),
                chunks_failed: failed,
                bytes_stored,
                chunk_ids,
            })
        })
        .await
        .map_err(|e| format!("store task failed: {e}"))?;

        self.monitor.end_request(timer, result.is_err());
        let result = result.map_err(tool_error)?;

        tracing::info!(
            chunks_stored = result.chunks_stored,
            chunks_failed = result.chunks_failed,
            "context stored"
        );
        serde_json::to_string(&result).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Semantic retrieval with combined similarity/importance/recency ranking.
    #[tool(
        description = "Retrieve relevant context using semantic search and contextual ranking."
    )]
    async fn retrieve_context(
        &self,
        Parameters(params): Parameters<RetrieveContextParams>,
    ) -> Result<String, String> {
        let max_chunks = validate_range(params.max_chunks.unwrap_or(5), 1, 20, "max_chunks")?;

        let timer = self
            .monitor
            .start_request(&params.session_id, "retrieve_context");

        let db = Arc::clone(&self.db);
        let embedding = Arc::clone(&self.embedding);
        let session_id = params.session_id.clone();
        let query = params.query;

        let result = tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| AimemError::Internal(format!("db lock poisoned: {e}")))?;
            retrieve::retrieve(&conn, embedding.as_ref(), &session_id, &query, max_chunks, None)
        })
        .await
        .map_err(|e| format!("retrieve task failed: {e}"))?;

        self.monitor.end_request(timer, result.is_err());
        let result = result.map_err(tool_error)?;

        serde_json::to_string(&result).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Task-aware retrieval packed into a strict response-token budget.
    #[tool(
        description = "Retrieve context for the current task with task-type boosts, optional related-context expansion, pagination, and a response token budget."
    )]
    async fn context_aware_retrieve(
        &self,
        Parameters(params): Parameters<ContextAwareRetrieveParams>,
    ) -> Result<String, String> {
        let task_type: TaskType = params.task_type.parse()?;
        let max_chunks = validate_range(params.max_chunks.unwrap_or(5), 1, 50, "max_chunks")?;
        let _context_depth =
            validate_range(params.context_depth.unwrap_or(2), 1, 5, "context_depth")?;
        let max_tokens = validate_range(
            params
                .max_response_tokens
                .unwrap_or(self.config.response.max_tokens as u32),
            1000,
            24_000,
            "max_response_tokens",
        )?;
        let page = params.page.unwrap_or(1);
        if page < 1 {
            return Err("page must be >= 1".into());
        }
        let auto_expand = params.auto_expand.unwrap_or(false);

        let timer = self
            .monitor
            .start_request(&params.session_id, "context_aware_retrieve");
        tracing::info!(
            session_id = %params.session_id,
            task_type = task_type.as_str(),
            max_chunks,
            auto_expand,
            "context_aware_retrieve called"
        );

        let db = Arc::clone(&self.db);
        let embedding = Arc::clone(&self.embedding);
        let budget_config = BudgetConfig {
            max_tokens,
            enable_paging: params
                .enable_pagination
                .unwrap_or(self.config.response.enable_paging),
            page_size: self.config.response.page_size,
            truncate_content: self.config.response.truncate_content,
        };
        let session_id = params.session_id.clone();
        let current_task = params.current_task;

        let result = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let conn = db
                .lock()
                .map_err(|e| AimemError::Internal(format!("db lock poisoned: {e}")))?;

            let retrieval = retrieve::retrieve(
                &conn,
                embedding.as_ref(),
                &session_id,
                &current_task,
                max_chunks,
                Some(task_type),
            )?;

            let (related, relationships) = if auto_expand && !retrieval.chunks.is_empty() {
                retrieve::expand_related(
                    &conn,
                    embedding.as_ref(),
                    &session_id,
                    &retrieval.chunks,
                    max_chunks,
                )?
            } else {
                (Vec::new(), Vec::new())
            };

            let total_relevance = retrieval.total_score;
            let primary: Vec<ContextChunk> =
                retrieval.chunks.into_iter().map(|c| c.chunk).collect();

            let limiter = ResponseLimiter::new(budget_config);
            let packed = limiter.pack(
                primary,
                related,
                relationships,
                format!("Task-aware retrieval for {} task", task_type.as_str()),
                total_relevance,
                started.elapsed().as_millis() as u64,
                page as usize,
            );

            Ok::<_, AimemError>(packed)
        })
        .await
        .map_err(|e| format!("retrieve task failed: {e}"))?;

        self.monitor.end_request(timer, result.is_err());
        let packed = result.map_err(tool_error)?;

        tracing::info!(
            primary = packed.primary_chunks.len(),
            related = packed.related_chunks.len(),
            estimated_tokens = packed.token_limits.estimated_tokens,
            truncated = packed.token_limits.truncated_content,
            "context_aware_retrieve completed"
        );
        serde_json::to_string(&packed).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Session statistics: chunk count, bytes, relevance, activity window.
    #[tool(description = "Get a session overview: chunk count, memory usage, and activity.")]
    async fn summarize_session(
        &self,
        Parameters(params): Parameters<SummarizeSessionParams>,
    ) -> Result<String, String> {
        let timer = self
            .monitor
            .start_request(&params.session_id, "summarize_session");

        let db = Arc::clone(&self.db);
        let session_id = params.session_id;

        let result = tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| AimemError::Internal(format!("db lock poisoned: {e}")))?;
            store::session_summary(&conn, &session_id)
        })
        .await
        .map_err(|e| format!("summary task failed: {e}"))?;

        self.monitor.end_request(timer, result.is_err());
        let summary = result.map_err(tool_error)?;

        serde_json::to_string(&summary).map_err(|e| format!("serialization failed: {e}"))
    }

    /// One eviction sweep using the selected strategy.
    #[tool(description = "Clean old or low-relevance context using ttl, lru, or relevance strategy.")]
    async fn cleanup_session(
        &self,
        Parameters(params): Parameters<CleanupSessionParams>,
    ) -> Result<String, String> {
        let strategy: CleanupStrategy = params.strategy.parse()?;

        let timer = self
            .monitor
            .start_request(&params.session_id, "cleanup_session");

        let db = Arc::clone(&self.db);
        let session_id = params.session_id;

        let result = tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| AimemError::Internal(format!("db lock poisoned: {e}")))?;
            cleanup::cleanup_session(&conn, &session_id, strategy)
        })
        .await
        .map_err(|e| format!("cleanup task failed: {e}"))?;

        self.monitor.end_request(timer, result.is_err());
        let result = result.map_err(tool_error)?;

        serde_json::to_string(&result).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Phase-aware cleanup using the strategy ratio table.
    #[tool(
        description = "Optimize session memory for the current development phase using aggressive, balanced, or conservative sweeps."
    )]
    async fn smart_memory_manager(
        &self,
        Parameters(params): Parameters<SmartMemoryManagerParams>,
    ) -> Result<String, String> {
        let phase: SessionPhase = params.session_phase.parse()?;
        let strategy: MemoryStrategy = params.memory_strategy.parse()?;
        let preserve_important = params.preserve_important.unwrap_or(true);

        let timer = self
            .monitor
            .start_request(&params.session_id, "smart_memory_manager");

        let db = Arc::clone(&self.db);
        let session_id = params.session_id;

        let result = tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| AimemError::Internal(format!("db lock poisoned: {e}")))?;
            cleanup::smart_memory_sweep(&conn, &session_id, phase, strategy, preserve_important)
        })
        .await
        .map_err(|e| format!("sweep task failed: {e}"))?;

        self.monitor.end_request(timer, result.is_err());
        let result = result.map_err(tool_error)?;

        serde_json::to_string(&result).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Analyze a project tree and store the derived context.
    #[tool(
        description = "Analyze a project directory and store its context (overview, architecture, config, schema) for later retrieval."
    )]
    async fn auto_store_project(
        &self,
        Parameters(params): Parameters<AutoStoreProjectParams>,
    ) -> Result<String, String> {
        let focus_areas: Vec<FocusArea> = match params.focus_areas {
            Some(areas) => areas
                .iter()
                .map(|a| a.parse())
                .collect::<Result<_, String>>()?,
            None => vec![FocusArea::Architecture, FocusArea::Api, FocusArea::Database],
        };
        let threshold: Importance = params
            .importance_threshold
            .as_deref()
            .unwrap_or("medium")
            .parse()?;
        let silent = params.silent.unwrap_or(true);

        let timer = self
            .monitor
            .start_request(&params.session_id, "auto_store_project");

        let db = Arc::clone(&self.db);
        let embedding = Arc::clone(&self.embedding);
        let sessions = Arc::clone(&self.sessions);
        let session_id = params.session_id.clone();
        let project_path = params.project_path;

        let result = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            sessions.ensure_session(&session_id)?;

            let analyzer = ProjectAnalyzer::default();
            let analysis = analyzer.analyze(&project_path, focus_areas)?;
            let sections = analyzer.context_sections(&analysis);

            let mut chunk_ids = Vec::new();
            for section in sections {
                if section.importance.rank() < threshold.rank() {
                    continue;
                }

                // Embedding failures skip the section, never the request
                let vector = match embedding.embed(&section.content) {
                    Ok(v) => v,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to embed analysis section");
                        continue;
                    }
                };

                let now = store::now_rfc3339();
                let chunk = ContextChunk {
                    id: uuid::Uuid::now_v7().to_string(),
                    session_id: session_id.clone(),
                    content: section.content,
                    summary: section.summary,
                    embedding: Some(vector),
                    relevance: section.relevance,
                    importance: section.importance,
                    created_at: now.clone(),
                    updated_at: now,
                    ttl_deadline: None,
                };

                let conn = db
                    .lock()
                    .map_err(|e| AimemError::Internal(format!("db lock poisoned: {e}")))?;
                if let Err(err) = store::put_chunk(&conn, &chunk, ANALYSIS_TTL_SECS) {
                    tracing::warn!(error = %err, "failed to store analysis chunk");
                    continue;
                }
                chunk_ids.push(chunk.id);
            }

            Ok::<_, AimemError>(AutoStoreProjectResult {
                chunks_stored: chunk_ids.len(),
                chunk_ids,
                duration_ms: started.elapsed().as_millis() as u64,
                analysis: (!silent).then_some(analysis),
            })
        })
        .await
        .map_err(|e| format!("analysis task failed: {e}"))?;

        self.monitor.end_request(timer, result.is_err());
        let result = result.map_err(tool_error)?;

        tracing::info!(
            chunks_stored = result.chunks_stored,
            duration_ms = result.duration_ms,
            "project analysis stored"
        );
        serde_json::to_string(&result).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Deterministic project session for a working directory.
    #[tool(
        description = "Detect the project for a working directory and return its stable main session."
    )]
    async fn get_or_create_project_session(
        &self,
        Parameters(params): Parameters<ProjectSessionParams>,
    ) -> Result<String, String> {
        if params.working_dir.is_empty() {
            return Err("working_dir must not be empty".into());
        }

        let timer = self.monitor.start_request("", "get_or_create_project_session");

        let sessions = Arc::clone(&self.sessions);
        let working_dir = params.working_dir;

        let result = tokio::task::spawn_blocking(move || {
            sessions.get_or_create_project_session(&working_dir)
        })
        .await
        .map_err(|e| format!("session task failed: {e}"))?;

        self.monitor.end_request(timer, result.is_err());
        let session = result.map_err(tool_error)?;

        serde_json::to_string(&session).map_err(|e| format!("serialization failed: {e}"))
    }
}

#[tool_handler]
impl ServerHandler for AimemTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "AIMem is a semantic memory server. Use store_context to save \
                 conversation context, retrieve_context or context_aware_retrieve to \
                 search it, and cleanup_session / smart_memory_manager to manage \
                 retention."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

/// Validate an integer argument against an inclusive range.
fn validate_range(value: u32, min: u32, max: u32, name: &str) -> Result<usize, String> {
    if value < min || value > max {
        return Err(format!("{name} must be between {min} and {max} (got {value})"));
    }
    Ok(value as usize)
}

/// Render an engine error for the tool-call error channel, tagged with its
/// JSON-RPC code in the logs.
fn tool_error(err: AimemError) -> String {
    tracing::debug!(code = err.jsonrpc_code(), error = %err, "tool call failed");
    err.to_string()
}
