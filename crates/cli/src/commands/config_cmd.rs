//! `toolchat config`: show the effective configuration.

use std::path::Path;

use colored::Colorize;

pub fn show(path: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(path)?;
    let source = super::config_file(path);

    println!("{} {}", "# Config file:".dimmed(), source.display());
    if !config.has_api_key() {
        println!(
            "{}",
            "# No API key set (TOOLCHAT_API_KEY, TOGETHER_API_KEY or OPENAI_API_KEY)".yellow()
        );
    }
    println!("{}", config.redacted_toml());
    Ok(())
}
