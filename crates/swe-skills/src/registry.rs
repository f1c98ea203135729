use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use swe_core::{Result, Scope, SweError};

use crate::definition::{SKILL_FILE, SkillDefinition};

/// Name-keyed skill catalog, built once per session.
///
/// Scopes are applied in the order given; a later scope replaces earlier
/// entries of the same name. Pass global first and project second so project
/// skills shadow global ones.
#[derive(Debug, Default)]
pub struct SkillRegistry {
    skills: BTreeMap<String, SkillDefinition>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan every scope directory and build the catalog. Missing directories
    /// are skipped; unreadable skills are logged and left out.
    pub fn build(scopes: &[(Scope, PathBuf)]) -> Self {
        let mut registry = Self::new();
        for (scope, dir) in scopes {
            for def in discover_dir(dir, *scope) {
                registry.register(def);
            }
        }
        info!(count = registry.count(), "skill catalog built");
        registry
    }

    /// Add a skill, replacing any existing entry with the same name.
    pub fn register(&mut self, def: SkillDefinition) {
        if let Some(previous) = self.skills.get(&def.name) {
            debug!(
                skill = %def.name,
                shadowed = ?previous.file_path,
                by = ?def.file_path,
                "skill shadowed"
            );
        }
        self.skills.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&SkillDefinition> {
        self.skills.get(name)
    }

    /// All skills, sorted by name.
    pub fn list(&self) -> Vec<&SkillDefinition> {
        self.skills.values().collect()
    }

    pub fn count(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Full instructions for `name`, read from disk now.
    pub fn resolve(&self, name: &str) -> Result<String> {
        self.skills
            .get(name)
            .ok_or_else(|| SweError::Skill(format!("unknown skill '{name}'")))?
            .load_body()
    }

    /// The `<available_skills>` block for the system prompt: name,
    /// description, scope and path only.
    pub fn system_prompt_block(&self) -> Option<String> {
        if self.skills.is_empty() {
            return None;
        }

        let mut block = String::from("<available_skills>\n");
        for skill in self.skills.values() {
            block.push_str(&format!(
                "<skill>\n  <name>{}</name>\n  <description>{}</description>\n  <scope>{}</scope>\n  <file>{}</file>\n</skill>\n",
                skill.name,
                skill.description,
                skill.scope,
                skill.file_path.display(),
            ));
        }
        block.push_str(
            "To use a skill: read its SKILL.md with read_file first, then follow the instructions using your tools.\n",
        );
        block.push_str("</available_skills>");

        Some(block)
    }
}

/// Skills found directly under `dir` (one sub-directory per skill).
fn discover_dir(dir: &Path, scope: Scope) -> Vec<SkillDefinition> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(?dir, error = %e, "skills directory not readable, skipping");
            return vec![];
        }
    };

    let mut found = Vec::new();
    for entry in entries.flatten() {
        let skill_md = entry.path().join(SKILL_FILE);
        if !skill_md.is_file() {
            continue;
        }
        match SkillDefinition::read_header(&skill_md, scope) {
            Ok(def) => {
                debug!(skill = %def.name, %scope, path = ?skill_md, "found skill");
                found.push(def);
            }
            Err(e) => warn!(path = ?skill_md, error = %e, "skipping skill"),
        }
    }
    // Deterministic order when two folders in one scope claim the same name.
    found.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(root: &Path, folder: &str, name: &str, description: &str, body: &str) {
        let dir = root.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(SKILL_FILE),
            format!("---\nname: {name}\ndescription: {description}\n---\n\n{body}"),
        )
        .unwrap();
    }

    #[test]
    fn discover_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "my-skill", "my-skill", "First skill", "Do things.");
        write_skill(dir.path(), "another", "another", "Second skill", "More things.");
        let noise = dir.path().join("not-a-skill");
        std::fs::create_dir_all(&noise).unwrap();
        std::fs::write(noise.join("README.md"), "Just a readme.").unwrap();

        let reg = SkillRegistry::build(&[(Scope::Global, dir.path().to_path_buf())]);
        assert_eq!(reg.count(), 2);
        assert!(reg.get("my-skill").is_some());
        assert!(reg.get("not-a-skill").is_none());
    }

    #[test]
    fn project_shadows_global_entirely() {
        let global = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        write_skill(global.path(), "review", "review", "Global review", "Global body.");
        write_skill(global.path(), "lint", "lint", "Global lint", "Lint body.");
        write_skill(project.path(), "review", "review", "Project review", "Project body.");

        let reg = SkillRegistry::build(&[
            (Scope::Global, global.path().to_path_buf()),
            (Scope::Project, project.path().to_path_buf()),
        ]);

        let review = reg.get("review").unwrap();
        assert_eq!(review.description, "Project review");
        assert_eq!(review.scope, Scope::Project);
        assert_eq!(reg.resolve("review").unwrap(), "Project body.");

        let block = reg.system_prompt_block().unwrap();
        assert!(block.contains("Project review"));
        assert!(!block.contains("Global review"));
        assert!(block.contains("Global lint"));
    }

    #[test]
    fn catalog_block_has_no_bodies() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "github", "github", "Manage PRs", "SECRET-BODY-TEXT");
        let reg = SkillRegistry::build(&[(Scope::Global, dir.path().to_path_buf())]);

        let block = reg.system_prompt_block().unwrap();
        assert!(block.contains("<name>github</name>"));
        assert!(block.contains("<scope>global</scope>"));
        assert!(block.contains("read_file"));
        assert!(!block.contains("SECRET-BODY-TEXT"));
    }

    #[test]
    fn broken_skill_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "good", "good", "Works", "Body.");
        let bad = dir.path().join("bad");
        std::fs::create_dir_all(&bad).unwrap();
        std::fs::write(bad.join(SKILL_FILE), "---\nname: bad\n---\nno description").unwrap();

        let reg = SkillRegistry::build(&[(Scope::Global, dir.path().to_path_buf())]);
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn resolve_unknown_skill_errors() {
        assert!(SkillRegistry::new().resolve("nope").is_err());
    }

    #[test]
    fn empty_registry_has_no_block() {
        let reg = SkillRegistry::build(&[(Scope::Global, PathBuf::from("/nonexistent/skills"))]);
        assert!(reg.is_empty());
        assert!(reg.system_prompt_block().is_none());
    }
}
