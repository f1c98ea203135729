//! # swe-memory
//!
//! Read-side convention over memory files:
//!
//! - **AGENTS.md**: the global one (per agent) and the project one are
//!   concatenated, global first, into the initial context of every session.
//! - **Other documents**: any other `*.md` beside them is listed by name and
//!   path only. The model reads them with `read_file` when relevant.
//!
//! The store only writes when an agent is first used or explicitly reset.
//! During a session memory is updated with the ordinary `write_file` and
//! `edit_file` tools, so every update goes through approval.

pub mod store;

pub use store::{DEFAULT_AGENTS_MD, MemoryDocument, MemoryStore};
