//! toolchat CLI: the main entry point.
//!
//! Commands:
//! - `chat`    - Interactive chat or single-message mode
//! - `tools`   - List the tools the model can call
//! - `config`  - Show the effective configuration

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod commands;
mod terminal;

#[derive(Parser)]
#[command(
    name = "toolchat",
    about = "toolchat: chat with an LLM that can call tools",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.toolchat/config.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant
    Chat(ChatArgs),

    /// List the available tools and their parameter schemas
    Tools,

    /// Print the effective configuration (secrets redacted)
    Config,
}

#[derive(Args)]
pub struct ChatArgs {
    /// Send a single message instead of entering interactive mode
    #[arg(short, long)]
    message: Option<String>,

    /// Start from a previously exported conversation
    #[arg(long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// Save the conversation here when the chat ends
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,

    /// Override the maximum model calls per message
    #[arg(long)]
    max_iterations: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let debug = cli.verbose || std::env::var_os("TOOLCHAT_DEBUG").is_some();
    let filter = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Chat(args) => commands::chat::run(config_path, args).await?,
        Commands::Tools => commands::tools::run()?,
        Commands::Config => commands::config_cmd::show(config_path)?,
    }

    Ok(())
}
