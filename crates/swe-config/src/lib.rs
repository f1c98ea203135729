//! # swe-config
//!
//! Configuration for swe-workflow. Reads `swe.toml`, then applies environment
//! variable overrides, in that precedence order. The result is immutable for
//! the lifetime of a session.
//!
//! Also owns the on-disk layout: per-agent global directories, project-root
//! detection, and the skill/memory locations derived from both.

pub mod loader;
pub mod paths;
pub mod schema;

pub use loader::ConfigLoader;
pub use paths::{ProjectLayout, find_project_root, validate_agent_name};
pub use schema::SweConfig;
pub use schema::{ConfigWarning, ServicesConfig, WarningSeverity};
