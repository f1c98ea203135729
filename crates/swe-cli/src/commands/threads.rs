use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};

use swe_config::paths::{THREADS_DIR, home_base_dir};
use swe_core::Result;
use swe_runtime::ThreadStore;

use super::ThreadAction;

pub(super) fn cmd_threads(action: ThreadAction, agent: Option<&str>) -> Result<()> {
    let store = ThreadStore::new(home_base_dir().join(THREADS_DIR));

    match action {
        ThreadAction::List { limit } => {
            let threads = store.list(agent, limit)?;
            if threads.is_empty() {
                println!("No saved threads.");
                return Ok(());
            }
            println!("{}\n", style(format!("Threads ({}):", threads.len())).bold());
            for t in threads {
                let id = t.id.to_string();
                println!(
                    "  {}  {}  {}  {}",
                    style(&id[..8]).cyan(),
                    style(t.updated_at.format("%Y-%m-%d %H:%M")).dim(),
                    style(format!("{:<12}", t.agent)).bold(),
                    t.title.as_deref().unwrap_or("(empty)")
                );
                println!("    {}", style(format!("{id} · {} turns", t.turns)).dim());
            }
            println!();
            println!("Resume with: swe-workflow --resume <id>");
        }
        ThreadAction::Delete { id, yes } => {
            let record = store.find(&id)?;
            if !yes {
                let confirmed = Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt(format!(
                        "Delete thread {} ({})?",
                        record.id,
                        record.title.as_deref().unwrap_or("untitled")
                    ))
                    .default(false)
                    .interact()
                    .unwrap_or(false);
                if !confirmed {
                    println!("Cancelled.");
                    return Ok(());
                }
            }
            store.delete(record.id)?;
            println!("✅ Deleted thread {}", record.id);
        }
    }
    Ok(())
}
