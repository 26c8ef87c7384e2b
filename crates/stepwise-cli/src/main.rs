//! CLI entry point for Stepwise.
//!
//! This binary provides the `stepwise` command with subcommands for running
//! a tool-calling turn, listing the demo tools and inspecting the effective
//! configuration.

mod cli;
mod demo_tools;
mod render;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use stepwise_agent::{Message, OpenAiCaller, Orchestrator, StepwiseConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, DEFAULT_CONFIG_FILE};
use crate::render::Renderer;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    init_tracing("warn");

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);

    match cli.command {
        Commands::Ask {
            prompt,
            steps,
            no_stream,
        } => cmd_ask(config_path.as_deref(), prompt.join(" "), steps, no_stream).await,
        Commands::Tools => cmd_tools(config_path.as_deref()),
        Commands::Config => cmd_config(config_path.as_deref()),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: ask
// ---------------------------------------------------------------------------

async fn cmd_ask(
    config_path: Option<&Path>,
    prompt: String,
    steps: Option<u32>,
    no_stream: bool,
) -> Result<ExitCode> {
    // 1. Load config and apply flag overrides.
    let mut config = StepwiseConfig::load(config_path).context("failed to load configuration")?;
    if let Some(steps) = steps {
        config.agent.step_budget = steps;
    }
    if no_stream {
        config.provider.stream = false;
    }
    config.validate().context("invalid command-line overrides")?;

    // 2. Build the model caller and the tool registry.
    let api_key = config.api_key()?;
    let caller = OpenAiCaller::new(config.openai_config(api_key))
        .context("failed to create model client")?;
    let registry = demo_tools::build_registry(&config.tools).context("failed to register tools")?;

    info!(
        model = %caller.model(),
        tools = registry.len(),
        step_budget = config.agent.step_budget,
        "ready"
    );

    let orchestrator = Orchestrator::new(
        Arc::new(caller),
        Arc::new(registry),
        config.agent_config(),
    );

    // 3. Assemble the history.
    let mut history = Vec::with_capacity(2);
    if let Some(system) = config.agent.system_prompt.as_deref() {
        history.push(Message::system(system));
    }
    history.push(Message::user(prompt));

    // 4. Ctrl+C cancels the turn.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n  Interrupted.");
                cancel.cancel();
            }
        });
    }

    // 5. Run and render.
    let (mut events, handle) = orchestrator.run_streaming(history, cancel);
    let mut renderer = Renderer::new(io::stdout().lock());
    while let Some(event) = events.next().await {
        renderer.render(&event).context("failed to write output")?;
    }

    match handle.await.context("turn task failed")? {
        Ok(outcome) => {
            info!(
                turn_id = %outcome.turn_id,
                steps = outcome.steps_used,
                model_calls = outcome.model_calls,
                "done"
            );
            Ok(ExitCode::SUCCESS)
        }
        // Already rendered from the event stream.
        Err(_) => Ok(ExitCode::FAILURE),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: tools
// ---------------------------------------------------------------------------

fn cmd_tools(config_path: Option<&Path>) -> Result<ExitCode> {
    let config = StepwiseConfig::load(config_path).context("failed to load configuration")?;
    let registry = demo_tools::build_registry(&config.tools).context("failed to register tools")?;

    if registry.is_empty() {
        println!("  No tools enabled.");
        return Ok(ExitCode::SUCCESS);
    }

    for tool in registry.describe_all() {
        println!();
        println!("  {}", tool.name);
        println!("    {}", tool.description);
        let schema = serde_json::to_string_pretty(&tool.input_schema)?;
        for line in schema.lines() {
            println!("    {line}");
        }
    }
    println!();

    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Subcommand: config
// ---------------------------------------------------------------------------

fn cmd_config(config_path: Option<&Path>) -> Result<ExitCode> {
    let config = StepwiseConfig::load(config_path).context("failed to load configuration")?;

    match config_path {
        Some(path) => println!("# source: {}", path.display()),
        None => println!("# source: defaults"),
    }
    let key_state = match config.api_key() {
        Ok(key) => redact(&key),
        Err(_) => "<not set>".to_owned(),
    };
    println!("# api key (${}): {key_state}", config.provider.api_key_env);
    println!();
    print!(
        "{}",
        toml::to_string_pretty(&config).context("failed to serialize configuration")?
    );

    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Explicit `--config`, else `stepwise.toml` in the working directory if
/// present.
fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    })
}

/// Keep only a short prefix and the last four characters of a secret.
fn redact(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_owned();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
