use console::style;
use dialoguer::{Input, theme::ColorfulTheme};

use swe_config::{ProjectLayout, SweConfig};
use swe_core::{Result, Scope, SweError};
use swe_skills::SkillRegistry;
use swe_skills::definition::{SKILL_FILE, SkillDefinition};

use super::SkillAction;

pub(super) fn cmd_skills(config: &SweConfig, action: SkillAction) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let layout = ProjectLayout::discover(&config.agent.name, &cwd)?;
    let registry = SkillRegistry::build(&layout.skill_scopes());

    match action {
        SkillAction::List { project } => {
            let skills: Vec<_> = registry
                .list()
                .into_iter()
                .filter(|s| !project || s.scope == Scope::Project)
                .collect();
            if skills.is_empty() {
                println!("No skills found.");
                println!("  Global:  {}", layout.global_skills_dir().display());
                if let Some(dir) = layout.project_skills_dir() {
                    println!("  Project: {}", dir.display());
                }
                println!("  Create one with: swe-workflow skills create <name>");
                return Ok(());
            }
            println!("{}\n", style(format!("Available Skills ({}):", skills.len())).bold());
            for skill in skills {
                println!("  {} {}", style(&skill.name).cyan(), style(format!("[{}]", skill.scope)).dim());
                println!("    {}", skill.description);
                println!("    {}", style(skill.file_path.display()).dim());
                println!();
            }
        }
        SkillAction::Info { name } => {
            let skill = registry
                .get(&name)
                .ok_or_else(|| SweError::Skill(format!("skill '{name}' not found")))?;
            println!("{} {}", style(&skill.name).bold(), style(format!("[{}]", skill.scope)).dim());
            println!("  {}", skill.description);
            println!("  File: {}", skill.file_path.display());
            println!("\n  {}", style("Instructions:").bold());
            for line in skill.load_body()?.lines() {
                println!("    {line}");
            }
        }
        SkillAction::Create {
            name,
            description,
            project,
        } => {
            validate_skill_name(&name)?;
            let (scope, dir) = if project {
                let dir = layout.project_skills_dir().ok_or_else(|| {
                    SweError::Skill(
                        "not inside a project (no .git found); drop --project to create a global skill"
                            .into(),
                    )
                })?;
                (Scope::Project, dir)
            } else {
                (Scope::Global, layout.global_skills_dir())
            };

            let skill_dir = dir.join(&name);
            if skill_dir.exists() {
                return Err(SweError::Skill(format!(
                    "skill '{name}' already exists at {}",
                    skill_dir.display()
                )));
            }

            let description = match description {
                Some(d) => d,
                None => Input::<String>::with_theme(&ColorfulTheme::default())
                    .with_prompt("Description")
                    .default(format!("Describe when to use {name}"))
                    .interact_text()
                    .map_err(|e| SweError::Skill(format!("no description given: {e}")))?,
            };

            std::fs::create_dir_all(&skill_dir)?;
            let path = skill_dir.join(SKILL_FILE);
            std::fs::write(&path, SkillDefinition::template(&name, &description))?;
            println!("✅ Created {scope} skill '{name}'");
            println!("   Edit {}", path.display());
        }
    }
    Ok(())
}

/// Skill names become directory names.
fn validate_skill_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SweError::Skill(format!(
            "invalid skill name '{name}': use letters, digits, '-' and '_'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skill_names() {
        assert!(validate_skill_name("code-review").is_ok());
        assert!(validate_skill_name("web_research2").is_ok());
        assert!(validate_skill_name("").is_err());
        assert!(validate_skill_name("../escape").is_err());
        assert!(validate_skill_name("has space").is_err());
        assert!(validate_skill_name("-flag").is_err());
    }
}
