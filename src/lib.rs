//! Copydesk: multi-tenant content operations.
//!
//! Organizations submit briefs, generate channel-specific copy variants via an
//! external text-generation provider (with optional retrieval over uploaded
//! organizational knowledge), collect edits/comments/approvals, schedule the
//! selected version to a platform connection, and review engagement rollups.
//!
//! Layering: `db` owns the SQLite schema and every invariant that can be
//! pushed into a single statement or transaction; `services` compose
//! multi-step operations; `generation`/`ingestion` are the provider-facing
//! adapters; `http` is the thin request surface.

pub mod config;
pub mod db;
pub mod generation;
pub mod http;
pub mod ingestion;
pub mod migrations;
pub mod retrieval;
pub mod services;
pub mod state;
pub mod types;
pub mod util;
