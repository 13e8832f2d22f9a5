//! MCP server initialization over stdio.
//!
//! Wires the database, embedding provider, session registry, and metrics into
//! a running tool handler.

use anyhow::Result;
use rmcp::ServiceExt;
use std::sync::{Arc, Mutex};

use crate::config::AimemConfig;
use crate::db;
use crate::embedding;
use crate::metrics::PerformanceMonitor;
use crate::project::ProjectDetector;
use crate::session::SessionManager;
use crate::tools::AimemTools;

/// Shared setup: open DB, create the embedding provider, build the session
/// registry and monitor.
fn setup_shared_state(config: AimemConfig) -> Result<AimemTools> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    // Detect an embedding model swap so stale vectors are noticed at startup
    if let Ok(Some(stored_model)) = db::get_embedding_model(&conn) {
        if stored_model != config.embedding.model {
            tracing::warn!(
                stored = %stored_model,
                configured = %config.embedding.model,
                "embedding model changed — existing vectors were produced by a different model"
            );
        }
    }

    let db = Arc::new(Mutex::new(conn));

    let provider = embedding::create_provider(&config.embedding)?;
    let embedding: Arc<dyn embedding::EmbeddingProvider> = Arc::from(provider);
    tracing::info!(model = %config.embedding.model, "embedding provider ready");

    let detector = Arc::new(ProjectDetector::default());
    let sessions = Arc::new(SessionManager::new(Arc::clone(&db), detector));
    let monitor = Arc::new(PerformanceMonitor::new());
    let config = Arc::new(config);

    Ok(AimemTools::new(db, embedding, sessions, monitor, config))
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: AimemConfig) -> Result<()> {
    tracing::info!("starting AIMem MCP server on stdio");

    let tools = setup_shared_state(config)?;
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running — waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}
