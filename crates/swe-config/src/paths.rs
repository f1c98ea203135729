use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use swe_core::{Result, Scope, SweError};

/// Name of the per-user and per-project configuration directory.
pub const APP_DIR: &str = ".swe-workflow";
pub const AGENTS_FILE: &str = "AGENTS.md";
pub const SKILLS_DIR: &str = "skills";
pub const THREADS_DIR: &str = "threads";

/// Directory names under the base dir that are not agents.
const RESERVED_NAMES: &[&str] = &[THREADS_DIR];

static AGENT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_\-\s]+$").expect("agent name pattern is valid")
});

/// `~/.swe-workflow`, or `./.swe-workflow` when there is no home directory.
pub fn home_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Agent names become directory names, so only a safe alphabet is allowed.
pub fn validate_agent_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SweError::InvalidAgentName("name cannot be empty".into()));
    }
    if !AGENT_NAME.is_match(name) {
        return Err(SweError::InvalidAgentName(format!(
            "'{name}' may only contain letters, digits, '-', '_' and spaces"
        )));
    }
    // Compared loosely so case-insensitive file systems cannot alias them.
    let folded = name.trim().to_lowercase();
    if RESERVED_NAMES.contains(&folded.as_str()) {
        return Err(SweError::InvalidAgentName(format!(
            "'{name}' is reserved for swe-workflow's own data"
        )));
    }
    Ok(())
}

/// Nearest ancestor of `start` (inclusive) that contains a `.git` entry.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Where everything for one agent lives, globally and in the current project.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    base: PathBuf,
    agent: String,
    project_root: Option<PathBuf>,
}

impl ProjectLayout {
    /// Layout rooted at `base` (normally `~/.swe-workflow`), detecting the
    /// project from `cwd`.
    pub fn new(base: impl Into<PathBuf>, agent: &str, cwd: &Path) -> Result<Self> {
        validate_agent_name(agent)?;
        Ok(Self {
            base: base.into(),
            agent: agent.to_string(),
            project_root: find_project_root(cwd),
        })
    }

    /// Layout under the user's home directory.
    pub fn discover(agent: &str, cwd: &Path) -> Result<Self> {
        Self::new(home_base_dir(), agent, cwd)
    }

    pub fn agent_name(&self) -> &str {
        &self.agent
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    pub fn agent_dir(&self) -> PathBuf {
        self.base.join(&self.agent)
    }

    pub fn global_agents_md(&self) -> PathBuf {
        self.agent_dir().join(AGENTS_FILE)
    }

    pub fn global_skills_dir(&self) -> PathBuf {
        self.agent_dir().join(SKILLS_DIR)
    }

    pub fn threads_dir(&self) -> PathBuf {
        self.base.join(THREADS_DIR)
    }

    /// `<root>/.swe-workflow`, when a project was detected.
    pub fn project_dir(&self) -> Option<PathBuf> {
        self.project_root.as_ref().map(|r| r.join(APP_DIR))
    }

    pub fn project_skills_dir(&self) -> Option<PathBuf> {
        self.project_dir().map(|d| d.join(SKILLS_DIR))
    }

    /// Skill directories, global first so that project entries override.
    pub fn skill_scopes(&self) -> Vec<(Scope, PathBuf)> {
        let mut scopes = vec![(Scope::Global, self.global_skills_dir())];
        if let Some(dir) = self.project_skills_dir() {
            scopes.push((Scope::Project, dir));
        }
        scopes
    }
}
