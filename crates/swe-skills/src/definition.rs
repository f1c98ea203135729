use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use swe_core::{Result, Scope, SweError};

pub const SKILL_FILE: &str = "SKILL.md";

/// The catalog entry for one skill. Holds the header only; the body stays
/// on disk until [`SkillDefinition::load_body`] is called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDefinition {
    /// From the header, or the directory name when the header has none.
    pub name: String,
    /// Short description shown in the system prompt.
    pub description: String,
    pub scope: Scope,
    /// Absolute path to the SKILL.md file.
    pub file_path: PathBuf,
    /// Base directory of the skill (parent of SKILL.md).
    pub base_dir: PathBuf,
}

impl SkillDefinition {
    /// Read the header of a SKILL.md, stopping at the closing `---`.
    pub fn read_header(path: &Path, scope: Scope) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            SweError::Skill(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut lines = BufReader::new(file).lines();

        let mut header = Vec::new();
        let mut opened = false;
        let mut closed = false;
        for line in lines.by_ref() {
            let line = line?;
            let trimmed = line.trim();
            if !opened {
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed != "---" {
                    return Err(SweError::Skill(format!(
                        "{} must start with front matter (---)",
                        path.display()
                    )));
                }
                opened = true;
                continue;
            }
            if trimmed == "---" {
                closed = true;
                break;
            }
            header.push(line);
        }
        if !closed {
            return Err(SweError::Skill(format!(
                "{}: missing closing --- for front matter",
                path.display()
            )));
        }

        let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        Self::from_header(&header.join("\n"), scope, path.to_path_buf(), base_dir)
    }

    /// Build from header text (without the fences).
    pub fn from_header(
        header: &str,
        scope: Scope,
        file_path: PathBuf,
        base_dir: PathBuf,
    ) -> Result<Self> {
        let mut name = String::new();
        let mut description = String::new();

        for line in header.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                match key.trim() {
                    "name" => name = unquote(value),
                    "description" => description = unquote(value),
                    _ => {}
                }
            }
        }

        if name.is_empty() {
            name = base_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        if name.is_empty() {
            return Err(SweError::Skill(format!(
                "{}: skill has no name",
                file_path.display()
            )));
        }
        if description.is_empty() {
            return Err(SweError::Skill(format!("skill '{name}' has no description")));
        }

        Ok(Self {
            name,
            description,
            scope,
            file_path,
            base_dir,
        })
    }

    /// Read the full instructions. `{baseDir}` expands to the skill directory.
    pub fn load_body(&self) -> Result<String> {
        let content = std::fs::read_to_string(&self.file_path).map_err(|e| {
            SweError::Skill(format!("failed to read {}: {}", self.file_path.display(), e))
        })?;
        let body = strip_front_matter(&content);
        Ok(body.replace("{baseDir}", &self.base_dir.to_string_lossy()))
    }

    /// A starter SKILL.md for `skills create`.
    pub fn template(name: &str, description: &str) -> String {
        format!(
            "---\nname: {name}\ndescription: {description}\n---\n\n\
             # {name}\n\n\
             ## When to use this skill\n\
             Describe the situations this skill applies to.\n\n\
             ## Instructions\n\
             1. First step\n\
             2. Second step\n"
        )
    }
}

fn strip_front_matter(content: &str) -> &str {
    let trimmed = content.trim_start();
    let Some(after_first) = trimmed.strip_prefix("---") else {
        return content.trim();
    };
    match after_first.find("\n---") {
        Some(end) => {
            let rest = &after_first[end + 4..];
            rest.trim()
        }
        None => content.trim(),
    }
}

/// Remove surrounding quotes from a header value.
fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}
