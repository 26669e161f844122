//! `toolchat tools`: list the built-in tools.

use colored::Colorize;

pub fn run() -> anyhow::Result<()> {
    let registry = toolchat_tools::default_registry()?;

    for def in registry.list() {
        println!("{}  {}", def.name.bold().green(), def.description);
        let schema = serde_json::to_string_pretty(&def.parameters)?;
        for line in schema.lines() {
            println!("    {}", line.dimmed());
        }
        println!();
    }

    Ok(())
}
