//! CLI argument definitions for Stepwise.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Config file picked up from the working directory when `--config` is not
/// given.
pub const DEFAULT_CONFIG_FILE: &str = "stepwise.toml";

/// Stepwise -- bounded tool-calling for language models.
#[derive(Parser)]
#[command(
    name = "stepwise",
    version,
    about = "Stepwise -- bounded tool-calling for language models",
    long_about = "Runs a conversation turn against an OpenAI-compatible model, executing the \
                  tools it asks for until it answers or the step budget runs out."
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask the model a question and run the tools it requests.
    Ask {
        /// The prompt; multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,

        /// Override the step budget for this turn.
        #[arg(long, short = 'n')]
        steps: Option<u32>,

        /// Wait for the whole reply instead of streaming it.
        #[arg(long)]
        no_stream: bool,
    },

    /// List the available tools and their input schemas.
    Tools,

    /// Print the effective configuration.
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_joins_prompt_words() {
        let cli = Cli::parse_from(["stepwise", "ask", "weather", "in", "Cairo?", "--steps", "2"]);
        match cli.command {
            Commands::Ask {
                prompt,
                steps,
                no_stream,
            } => {
                assert_eq!(prompt.join(" "), "weather in Cairo?");
                assert_eq!(steps, Some(2));
                assert!(!no_stream);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["stepwise", "tools", "--config", "custom.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(cli.command, Commands::Tools));
    }

    #[test]
    fn ask_requires_a_prompt() {
        assert!(Cli::try_parse_from(["stepwise", "ask"]).is_err());
    }
}
