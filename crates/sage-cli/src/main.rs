//! Sage - ask the ancient thinkers
//!
//! A terminal front end for two-stage chain-of-thought advice:
//! - Streaming answers from one thinker
//! - Side-by-side comparison of every thinker
//! - An interactive session with history

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sage_core::{paths, AiClient, ApiKey, CotOrchestrator, PersonaRegistry, SageConfig};

mod commands;
mod interactive;
mod render;

use commands::AppContext;

/// Sage - Ancient Thinkers Advisor
#[derive(Parser)]
#[command(name = "sage")]
#[command(about = "Ask Laozi, Confucius and Guan Zhong for advice", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to ~/.sage/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Persona table replacing the built-in thinkers
    #[arg(long, global = true)]
    personas: Option<PathBuf>,

    /// Per-stage timeout in seconds (0 disables it)
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one thinker, streaming the answer
    Ask {
        /// The question or dilemma
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Persona key or 1-based index (see `sage personas`)
        #[arg(short, long)]
        persona: Option<String>,
    },

    /// Ask every thinker the same question
    Compare {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// List the thinkers
    Personas,

    /// List example questions
    Examples,

    /// Start an interactive session
    Interactive {
        /// Persona key or 1-based index to start with
        #[arg(short, long)]
        persona: Option<String>,
    },
}

fn init_logging() {
    // Log to file so tracing output never interleaves with streamed text
    let log_dir = paths::logs_dir();
    std::fs::create_dir_all(&log_dir).ok();

    let log_file = match std::fs::File::create(log_dir.join("sage.log")) {
        Ok(file) => file,
        Err(_) => return,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
}

fn load_registry(cli: &Cli, config: &SageConfig) -> Result<PersonaRegistry> {
    match cli.personas.as_ref().or(config.personas_file.as_ref()) {
        Some(path) => PersonaRegistry::from_path(path)
            .with_context(|| format!("Failed to load personas from {}", path.display())),
        None => PersonaRegistry::builtin().context("Built-in persona table is invalid"),
    }
}

fn build_context(cli: &Cli) -> Result<AppContext> {
    let config = match &cli.config {
        Some(path) => SageConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SageConfig::load().context("Failed to load config")?,
    };
    let registry = Arc::new(load_registry(cli, &config)?);

    let mut options = config.cot_options();
    if let Some(secs) = cli.timeout {
        options.stage_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }

    let credentials = config.credentials().unwrap_or_else(|| {
        tracing::warn!("No API key configured");
        ApiKey::new("")
    });

    tracing::info!(
        model = %options.model,
        personas = registry.len(),
        timeout = ?options.stage_timeout,
        "Sage starting"
    );

    let client = Arc::new(AiClient::new(config.client_config()));
    Ok(AppContext {
        orchestrator: CotOrchestrator::new(client, registry, options),
        credentials,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let ctx = build_context(&cli)?;

    match cli.command {
        Some(Commands::Ask { question, persona }) => {
            let key = commands::resolve_persona(ctx.registry(), persona.as_deref());
            if commands::ask(&ctx, &question.join(" "), &key).await.is_none() {
                std::process::exit(1);
            }
        }
        Some(Commands::Compare { question }) => {
            if commands::compare(&ctx, &question.join(" ")).await.is_none() {
                std::process::exit(1);
            }
        }
        Some(Commands::Personas) => commands::personas(ctx.registry())?,
        Some(Commands::Examples) => commands::examples(ctx.registry())?,
        Some(Commands::Interactive { persona }) => {
            let key = commands::resolve_persona(ctx.registry(), persona.as_deref());
            interactive::run(&ctx, key).await?;
        }
        None => {
            let key = commands::resolve_persona(ctx.registry(), None);
            interactive::run(&ctx, key).await?;
        }
    }

    Ok(())
}
