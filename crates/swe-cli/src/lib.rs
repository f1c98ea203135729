//! # swe-cli
//!
//! Command-line interface and operator console for swe-workflow.
//!
//! ## Commands
//!
//! - `swe-workflow` — Interactive chat (`--resume`, `--auto-approve`, `--model`)
//! - `swe-workflow --non-interactive --task "..."` — Run one task and exit
//! - `swe-workflow skills list|info|create` — Manage skills
//! - `swe-workflow list` / `reset` — Manage agents
//! - `swe-workflow threads list|delete` — Manage saved threads
//! - `swe-workflow config` / `doctor` / `init` — Inspect and create configuration

pub mod commands;

pub use commands::Cli;
