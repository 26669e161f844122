pub mod chat;
pub mod config_cmd;
pub mod tools;

use std::path::{Path, PathBuf};

use anyhow::Context;
use toolchat_config::AppConfig;

/// Load config from `path` if given, else from the default location.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => AppConfig::load().context("Failed to load config"),
    }
}

/// The config file in effect: `path`, or the default location.
pub fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}
