//! # swe-skills
//!
//! Skills are reusable instruction bundles. Each skill is a directory holding
//! a `SKILL.md` file: a small front-matter header followed by free-form
//! Markdown instructions.
//!
//! ## SKILL.md Format
//!
//! ```markdown
//! ---
//! name: review
//! description: Review a diff for correctness and style
//! ---
//!
//! # Review
//!
//! 1. Read the changed files with `read_file`
//! 2. ...
//! ```
//!
//! ## Progressive disclosure
//!
//! 1. At session start the registry reads only the headers, from the global
//!    skills directory and then the project one. A project skill with the
//!    same name replaces the global skill entirely.
//! 2. Names, descriptions and file paths go into the system prompt.
//! 3. When a skill applies, the model reads the SKILL.md with `read_file`.
//!    The registry never injects bodies into the transcript.

pub mod definition;
pub mod registry;

pub use definition::SkillDefinition;
pub use registry::SkillRegistry;
