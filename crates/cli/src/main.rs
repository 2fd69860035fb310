mod config;
mod error;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use runtime::{
    AnthropicBackend, Backend, ConversationEngine, EngineEvent, McpConnector, StopReason,
    ToolHost, ToolSpec, with_registry,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::Result;

const CONFIG_FILE: &str = "deckhand.toml";

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(about = "Chat with a model that can call MCP tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file [default: deckhand.toml]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log more to stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// Connect the configured providers and list their tools
    Tools,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(CONFIG_FILE)?,
    };
    tracing::debug!(providers = config.providers.len(), "configuration loaded");

    match cli.command {
        Some(Commands::Chat) | None => cmd_chat(&config).await,
        Some(Commands::Tools) => cmd_tools(&config).await,
    }
}

async fn cmd_chat(config: &Config) -> Result<()> {
    let mut builder = AnthropicBackend::builder(config.auth()?, &config.backend.model)
        .max_tokens(config.backend.max_tokens);
    if let Some(system) = &config.backend.system {
        builder = builder.system(system.as_str());
    }
    let backend = builder.build();

    println!("deckhand v{}", env!("CARGO_PKG_VERSION"));
    println!("Model: {}", backend.model());

    with_registry(
        McpConnector::new(config.handshake_timeout()),
        config.registry_options(),
        &config.providers,
        async |registry| {
            println!(
                "{}",
                connected_banner(registry.providers().count(), registry.catalog())
            );
            println!("Type your queries or 'quit' to exit.");

            let engine = ConversationEngine::new(backend, registry)
                .with_options(config.engine_options())
                .on_event(print_event);
            chat_loop(&engine).await
        },
    )
    .await??;

    Ok(())
}

fn connected_banner(providers: usize, tools: &[ToolSpec]) -> String {
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    format!("Connected to {providers} provider(s) with tools: {names:?}")
}

async fn chat_loop<B: Backend, H: ToolHost>(engine: &ConversationEngine<B, H>) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("\nQuery: ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            println!();
            break;
        }

        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("quit") {
            break;
        }

        match engine.process_query(query).await {
            Ok(transcript) => match transcript.stop {
                StopReason::Answered => {}
                StopReason::EmptyResponse => println!("(no response)"),
                StopReason::TurnLimit => {
                    eprintln!("Stopped after {} model calls.", transcript.turns)
                }
            },
            Err(e) => eprintln!("\nError: {e}"),
        }
    }

    Ok(())
}

fn print_event(event: &EngineEvent<'_>) {
    match event {
        EngineEvent::Text(text) => println!("{text}"),
        EngineEvent::ToolCall(call) => {
            let args = Value::Object(call.arguments.clone());
            println!("Calling tool {} with args {args}", call.name);
        }
        EngineEvent::ToolResult { call, result } if result.is_error => {
            eprintln!("Tool {} failed: {}", call.name, result.content);
        }
        EngineEvent::ToolResult { .. } => {}
    }
}

async fn cmd_tools(config: &Config) -> Result<()> {
    with_registry(
        McpConnector::new(config.handshake_timeout()),
        config.registry_options(),
        &config.providers,
        async |registry| {
            let catalog = registry.catalog();
            if catalog.is_empty() {
                println!("No tools available.");
                return;
            }

            println!("{:<28}  {:<16}  DESCRIPTION", "TOOL", "PROVIDER");
            println!("{}", "-".repeat(80));
            for tool in catalog {
                let provider = registry.route(&tool.name).unwrap_or("-");
                let summary = tool.description.lines().next().unwrap_or("");
                println!("{:<28}  {:<16}  {summary}", tool.name, provider);
            }
        },
    )
    .await?;

    Ok(())
}
