//! Core types, configuration, and viewer context for Threadline
//!
//! This crate provides:
//! - Configuration management (`Config`, environment parsing)
//! - The viewer/auth context (`Viewer`) with fail-fast accessors
//! - Filter and sort value objects consumed by the collection query builder
//! - The `ThreadCounts` aggregate type
//! - Common error types

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod models;

// Re-export key types for convenience
pub use config::{AppEnvironment, Config, env_value};
pub use error::{Error as CoreError, Result as CoreResult};
pub use models::{
    Location, SortBy, SortDirection, TenantScope, ThreadCollectionFilter, ThreadCounts, Viewer,
    ViewerRelation,
};
