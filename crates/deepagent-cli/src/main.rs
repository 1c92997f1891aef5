//! deepagent - terminal front end for the deep agent orchestrator
//!
//! Reads one request per line, runs it on the configured thread, and prints
//! the relayed stream: assistant text as it arrives, tool calls, TODO lists,
//! new workspace files, and sub-agent lifecycle.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use deepagent_core::agent::subagent::SubAgentRegistry;
use deepagent_core::ai::OpenAiClient;
use deepagent_core::{paths, AppConfig, DeepAgent, DeepAgentBuilder, RelayOutput, StreamRelay};

/// deepagent - requirement, architecture and system modelling agents
#[derive(Parser)]
#[command(name = "deepagent")]
#[command(about = "Plan, delegate and write documents with a team of agents", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.deepagent/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Conversation thread to continue
    #[arg(short, long)]
    thread: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured sub-agent roles and their permissions
    Roles,
}

const EXIT_WORDS: [&str; 3] = ["exit", "quit", "bye"];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = AppConfig::load(cli.config.as_deref())?;
    let agent = DeepAgentBuilder::from_config(&config, Arc::new(OpenAiClient::new()))
        .build()
        .context("invalid agent configuration")?;

    match cli.command {
        Some(Commands::Roles) => {
            print_roles(agent.role_registry());
            Ok(())
        }
        None => {
            let thread_id = cli.thread.unwrap_or_else(new_thread_id);
            repl(Arc::new(agent), config, thread_id).await
        }
    }
}

/// Log to a file; stdout belongs to the relay.
fn init_logging() -> Result<()> {
    let log_dir = match paths::ensure_logs_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Failed to create log directory: {}", e);
            return Ok(());
        }
    };

    let log_file = std::fs::File::create(log_dir.join("deepagent.log"))
        .with_context(|| format!("failed to create log file in {}", log_dir.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn new_thread_id() -> String {
    format!(
        "session-{}-{}",
        chrono::Local::now().format("%Y%m%d-%H%M%S"),
        &uuid::Uuid::new_v4().simple().to_string()[..6]
    )
}

fn print_roles(roles: &SubAgentRegistry) {
    for entry in roles.iter() {
        println!("{}", entry.spec.name);
        println!("  {}", entry.spec.description.trim());
        println!("  tools: {}", entry.tools.names().join(", "));
        println!("  read:  {}", entry.scope.read.join(", "));
        println!("  write: {}", entry.scope.write.join(", "));
    }
}

async fn repl(agent: Arc<DeepAgent>, config: AppConfig, thread_id: String) -> Result<()> {
    println!("deepagent · thread {}", thread_id);
    println!("Roles: {}", agent.roles().join(", "));
    println!("Type a request, or exit to leave.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&input.to_lowercase().as_str()) {
            println!("Bye.");
            break;
        }

        tracing::info!(thread_id = %thread_id, "User request");
        let mut relay = StreamRelay::new(config.relay.clone());
        let (mut rx, handle) = agent.run(thread_id.clone(), input);
        let mut printer = Printer::default();

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => {
                        for output in relay.handle(event) {
                            printer.print(&output)?;
                        }
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    agent.cancel();
                    printer.line("(cancelling)")?;
                }
            }
        }

        match handle.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => printer.line(&format!("Run ended: {}", e))?,
            Err(e) => printer.line(&format!("Run aborted: {}", e))?,
        }
        if rx.dropped_count() > 0 {
            tracing::warn!(dropped = rx.dropped_count(), "Relay fell behind");
        }
        println!();
    }

    Ok(())
}

/// Tracks which role is streaming so text from different agents is headed.
#[derive(Default)]
struct Printer {
    role: Option<String>,
    mid_line: bool,
}

impl Printer {
    fn print(&mut self, output: &RelayOutput) -> Result<()> {
        match output {
            RelayOutput::Text { role, delta } => {
                if self.role.as_deref() != Some(role.as_str()) {
                    self.end_line();
                    println!("\n[{}]", role);
                    self.role = Some(role.clone());
                }
                print!("{}", delta);
                std::io::stdout().flush()?;
                self.mid_line = !delta.ends_with('\n');
            }
            RelayOutput::Finished => self.end_line(),
            other => {
                let rendered = other.render();
                if !rendered.is_empty() {
                    self.line(&rendered)?;
                }
                // Next text block gets a fresh header.
                self.role = None;
            }
        }
        Ok(())
    }

    fn line(&mut self, text: &str) -> Result<()> {
        self.end_line();
        println!("{}", text);
        Ok(())
    }

    fn end_line(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }
}
