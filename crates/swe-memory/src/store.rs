use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use swe_config::ProjectLayout;
use swe_config::paths::{AGENTS_FILE, APP_DIR};
use swe_core::{Result, Scope, SweError};

/// Starter AGENTS.md for a new agent.
pub const DEFAULT_AGENTS_MD: &str = "# Agent memory

Facts recorded here are loaded into every session with this agent.

## Preferences
- (none recorded yet)

## Conventions
- (none recorded yet)
";

/// A memory file other than AGENTS.md. Content is not held; read it with
/// [`MemoryStore::read_document`] or the `read_file` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryDocument {
    /// File stem, e.g. `conventions` for `conventions.md`.
    pub name: String,
    pub path: PathBuf,
    pub scope: Scope,
}

/// Locates memory files for one agent and (optionally) one project.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    global_dir: PathBuf,
    project_root: Option<PathBuf>,
}

impl MemoryStore {
    /// `global_dir` is the agent directory (`~/.swe-workflow/<agent>`).
    pub fn new(global_dir: impl Into<PathBuf>, project_root: Option<PathBuf>) -> Self {
        Self {
            global_dir: global_dir.into(),
            project_root,
        }
    }

    pub fn from_layout(layout: &ProjectLayout) -> Self {
        Self::new(layout.agent_dir(), layout.project_root().map(Path::to_path_buf))
    }

    pub fn global_agents_md(&self) -> PathBuf {
        self.global_dir.join(AGENTS_FILE)
    }

    /// Project AGENTS.md candidates in load order.
    pub fn project_agents_mds(&self) -> Vec<PathBuf> {
        match &self.project_root {
            Some(root) => vec![root.join(APP_DIR).join(AGENTS_FILE), root.join(AGENTS_FILE)],
            None => vec![],
        }
    }

    /// Create the agent directory with a starter AGENTS.md on first use.
    /// Returns whether anything was created.
    pub fn ensure_global(&self) -> Result<bool> {
        let path = self.global_agents_md();
        if path.exists() {
            return Ok(false);
        }
        std::fs::create_dir_all(&self.global_dir)?;
        std::fs::write(&path, DEFAULT_AGENTS_MD)?;
        debug!(path = %path.display(), "created agent memory");
        Ok(true)
    }

    /// Wipe the agent directory and start over with `content` as AGENTS.md.
    pub fn reset_global(&self, content: &str) -> Result<()> {
        if self.global_dir.exists() {
            std::fs::remove_dir_all(&self.global_dir)?;
        }
        std::fs::create_dir_all(&self.global_dir)?;
        std::fs::write(self.global_agents_md(), content)?;
        Ok(())
    }

    /// Global AGENTS.md followed by the project ones. Absent or empty files
    /// contribute nothing.
    pub fn load_initial(&self) -> String {
        let mut parts = Vec::new();
        for path in std::iter::once(self.global_agents_md()).chain(self.project_agents_mds()) {
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    let content = content.trim_end();
                    if !content.trim().is_empty() {
                        debug!(?path, bytes = content.len(), "loaded memory");
                        parts.push(content.to_string());
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(?path, error = %e, "could not read memory file, treating as empty"),
            }
        }
        parts.join("\n\n")
    }

    /// Other memory documents, by name. A project document shadows a global
    /// one with the same name.
    pub fn list_documents(&self) -> Vec<MemoryDocument> {
        let mut docs = BTreeMap::new();
        let mut scopes = vec![(Scope::Global, self.global_dir.clone())];
        if let Some(root) = &self.project_root {
            scopes.push((Scope::Project, root.join(APP_DIR)));
        }

        for (scope, dir) in scopes {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let is_doc = path.is_file()
                    && path.extension().is_some_and(|e| e == "md")
                    && path.file_name().is_some_and(|n| n != AGENTS_FILE);
                if !is_doc {
                    continue;
                }
                if let Some(stem) = path.file_stem() {
                    let name = stem.to_string_lossy().into_owned();
                    docs.insert(name.clone(), MemoryDocument { name, path, scope });
                }
            }
        }
        docs.into_values().collect()
    }

    /// Content of a listed document.
    pub fn read_document(&self, name: &str) -> Result<String> {
        let doc = self
            .list_documents()
            .into_iter()
            .find(|d| d.name == name)
            .ok_or_else(|| SweError::Memory(format!("no memory document named '{name}'")))?;
        Ok(std::fs::read_to_string(&doc.path)?)
    }

    /// Memory section of the system prompt.
    pub fn system_prompt_block(&self) -> Option<String> {
        let initial = self.load_initial();
        let docs = self.list_documents();

        let mut block = String::from("<agent_memory>\n");
        if !initial.is_empty() {
            block.push_str(&initial);
            block.push('\n');
        }
        block.push_str(&format!(
            "Persist durable facts by editing {} (global) with edit_file or write_file.\n",
            self.global_agents_md().display()
        ));
        if let Some(project) = self.project_agents_mds().first() {
            block.push_str(&format!(
                "Project-specific facts belong in {}.\n",
                project.display()
            ));
        }
        block.push_str("</agent_memory>");

        if !docs.is_empty() {
            block.push_str("\n\n<memory_documents>\n");
            for doc in &docs {
                block.push_str(&format!("- {} ({}): {}\n", doc.name, doc.scope, doc.path.display()));
            }
            block.push_str("Read a document with read_file when the task touches its topic.\n");
            block.push_str("</memory_documents>");
        }
        Some(block)
    }
}
