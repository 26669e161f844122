//! Terminal frontend: reads stdin, writes colored turns to stdout.

use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use colored::Colorize;
use tokio::io::{self, AsyncBufReadExt, BufReader, Lines, Stdin};
use toolchat_core::frontend::Frontend;
use toolchat_core::message::{Message, Role};

/// One line of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Import(PathBuf),
    /// Export to the given file, or a generated name
    Export(Option<PathBuf>),
    History,
    Exit,
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q") {
        return Command::Exit;
    }
    if !line.starts_with('/') {
        return Command::Say(line.to_string());
    }

    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (line, ""),
    };
    match name {
        "/import" if !arg.is_empty() => Command::Import(PathBuf::from(arg)),
        "/export" if arg.is_empty() => Command::Export(None),
        "/export" => Command::Export(Some(PathBuf::from(arg))),
        "/history" => Command::History,
        _ => Command::Unknown(line.to_string()),
    }
}

pub struct TerminalFrontend {
    lines: Lines<BufReader<Stdin>>,
    pending_text: Option<String>,
    pending_snapshot: Option<String>,
    /// Human turns are echoed only when replaying history.
    show_human: bool,
}

impl TerminalFrontend {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(io::stdin()).lines(),
            pending_text: None,
            pending_snapshot: None,
            show_human: false,
        }
    }

    pub fn queue_text(&mut self, text: String) {
        self.pending_text = Some(text);
    }

    pub fn queue_snapshot(&mut self, snapshot: String) {
        self.pending_snapshot = Some(snapshot);
    }

    pub fn set_show_human(&mut self, show: bool) {
        self.show_human = show;
    }

    /// Prompt and read one line. `None` at end of input.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        print!("  {} ", "You >".bold().cyan());
        std::io::stdout().flush()?;
        self.lines.next_line().await
    }

    pub fn notice(&self, text: &str) {
        println!("  {}", text.dimmed());
    }
}

impl Default for TerminalFrontend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Frontend for TerminalFrontend {
    async fn render(&mut self, turn: &Message) {
        match turn.role {
            Role::Human if self.show_human => {
                println!("  {} {}", "You >".bold().cyan(), turn.content);
            }
            Role::Assistant => {
                eprint!("\r     \r");
                println!();
                for line in turn.content.lines() {
                    println!("  {} {line}", "Assistant >".bold().green());
                }
                println!();
            }
            _ => {}
        }
    }

    async fn get_user_text(&mut self) -> Option<String> {
        let text = self.pending_text.take()?;
        self.show_human = false;
        eprint!("  ...");
        Some(text)
    }

    async fn get_uploaded_snapshot(&mut self) -> Option<String> {
        let snapshot = self.pending_snapshot.take()?;
        self.show_human = true;
        Some(snapshot)
    }

    async fn report_error(&mut self, message: &str) {
        eprint!("\r     \r");
        eprintln!("  {} {message}", "[Error]".bold().red());
        println!();
    }
}
