//! Local semantic memory for AI assistants — persistent, chunked,
//! vector-ranked context over MCP.
//!
//! AIMem is an [MCP](https://modelcontextprotocol.io/) server that stores
//! free-form conversation context as embedded chunks, partitioned by session,
//! and serves task-aware retrieval under strict response-token budgets.
//!
//! # Architecture
//!
//! - **Storage**: SQLite (WAL) with chunks, sessions, and projects tables;
//!   embeddings are stored inline and compared with a linear cosine scan per
//!   session — sessions are bounded, so no ANN index is needed
//! - **Embeddings**: pluggable [`embedding::EmbeddingProvider`]; the built-in
//!   deterministic hash model keeps retrieval testable without model files
//! - **Retrieval**: combined similarity / importance / recency / relevance
//!   scoring with task-type keyword boosts and keyword-linked auto-expansion
//! - **Budgeting**: responses are packed into an estimated-token limit with
//!   pagination and word-boundary truncation
//! - **Transport**: MCP over stdio
//!
//! # Modules
//!
//! - [`config`] — YAML configuration with environment overrides
//! - [`db`] — SQLite initialization, schema, and migrations
//! - [`embedding`] — embedding provider trait, hash fallback, LRU cache
//! - [`chunker`] — content-type aware chunking with overlap
//! - [`summarizer`] — extractive summarization preserving code and links
//! - [`memory`] — store, retrieval pipeline, budget engine, cleanup sweeps
//! - [`project`] — project detection and deterministic project IDs
//! - [`session`] — session registry and resolution
//! - [`analyzer`] — project-tree analysis feeding `auto_store_project`
//! - [`metrics`] — request/session/operation performance counters

pub mod analyzer;
pub mod chunker;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod project;
pub mod session;
pub mod summarizer;
pub mod tools;

pub mod server;
