use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use std::path::Path;

use swe_config::paths::{AGENTS_FILE, THREADS_DIR, home_base_dir};
use swe_config::validate_agent_name;
use swe_core::{Result, SweError};
use swe_memory::{DEFAULT_AGENTS_MD, MemoryStore};

pub(super) fn cmd_list() -> Result<()> {
    let base = home_base_dir();
    let agents = list_agents(&base)?;
    if agents.is_empty() {
        println!("{}", style("No agents found.").yellow());
        println!(
            "{}",
            style(format!("Agents are created in {} when you first use them.", base.display())).dim()
        );
        return Ok(());
    }

    println!("{}\n", style("Available Agents:").bold());
    for (name, complete) in agents {
        if complete {
            println!("  • {}", style(&name).bold());
        } else {
            println!("  • {} {}", style(&name).bold(), style("(incomplete)").dim());
        }
        println!("    {}", style(base.join(&name).display()).dim());
    }
    println!();
    Ok(())
}

/// Agent directories under `base`, sorted, with whether each has an
/// AGENTS.md.
fn list_agents(base: &Path) -> Result<Vec<(String, bool)>> {
    let entries = match std::fs::read_dir(base) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut agents: Vec<(String, bool)> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            (name != THREADS_DIR && !name.starts_with('.'))
                .then(|| (name, e.path().join(AGENTS_FILE).exists()))
        })
        .collect();
    agents.sort();
    Ok(agents)
}

pub(super) fn cmd_reset(agent: &str, source: Option<&str>, yes: bool) -> Result<()> {
    validate_agent_name(agent)?;
    let base = home_base_dir();

    let (content, described) = match source {
        Some(source) => {
            validate_agent_name(source)?;
            let path = base.join(source).join(AGENTS_FILE);
            let content = std::fs::read_to_string(&path).map_err(|_| {
                SweError::Agent(format!("source agent '{source}' not found or has no {AGENTS_FILE}"))
            })?;
            (content, format!("contents of agent '{source}'"))
        }
        None => (DEFAULT_AGENTS_MD.to_string(), "default".to_string()),
    };

    let agent_dir = base.join(agent);
    if agent_dir.exists() && !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Remove {} (memory, skills and documents) and reset to {described}?",
                agent_dir.display()
            ))
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    MemoryStore::new(&agent_dir, None).reset_global(&content)?;
    println!("✅ Agent '{agent}' reset to {described}");
    println!("   {}", style(agent_dir.display()).dim());
    Ok(())
}
