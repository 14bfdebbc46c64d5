//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments, resolving the effective
//! configuration, and dispatching to the chat UI or one of the utility commands.

pub mod say;

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::cli::say::run_say;
use crate::core::config::data::path_display;
use crate::core::config::{Config, Overrides};
use crate::ui::chat_loop::run_chat;
use crate::utils::logging::init_file_logging;

#[derive(Parser)]
#[command(name = "llamachat", version)]
#[command(about = "A terminal chat interface for a local LLM inference server")]
#[command(
    long_about = "llamachat is a full-screen terminal chat interface that sends your messages \
to a locally hosted inference server (such as Ollama) and renders the response as it streams in.\n\n\
Configuration is read from the config file, then LLAMACHAT_ENDPOINT / LLAMACHAT_MODEL, \
then command-line flags; later sources win.\n\n\
Controls:\n\
  Type              Enter your message in the input field\n\
  Enter             Send the message\n\
  Esc               Interrupt the current response, or quit when idle\n\
  Ctrl+C            Quit the application"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Generate endpoint URL (default http://localhost:11434/api/generate)
    #[arg(short = 'e', long, global = true, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Model identifier to request
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Read configuration from this file instead of the default location
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Seconds to wait for the TCP connection to the server
    #[arg(long, global = true, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Seconds of silence from the server before a response is abandoned
    #[arg(long, global = true, value_name = "SECS")]
    pub read_timeout: Option<u64>,

    /// Write diagnostics to this file (filter with LLAMACHAT_LOG)
    #[arg(long, global = true, value_name = "PATH")]
    pub debug_log: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// Send a single prompt and print the streamed answer
    Say {
        /// Prompt text; multiple words are joined with spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the configuration file contents and the resolved settings
    Show,
    /// Write a configuration file with every key set to its default
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            connect_timeout_secs: self.connect_timeout,
            read_timeout_secs: self.read_timeout,
        }
    }

    fn config_path(&self) -> Result<PathBuf, Box<dyn Error>> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(Config::get_config_path()?),
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    if let Some(path) = &args.debug_log {
        init_file_logging(path)?;
    }

    let config_path = args.config_path()?;
    let overrides = args.overrides();

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let config = Config::load_from_path(&config_path)?.resolve(&overrides)?;
            run_chat(config).await
        }
        Commands::Say { prompt } => {
            let config = Config::load_from_path(&config_path)?.resolve(&overrides)?;
            run_say(config, prompt).await
        }
        Commands::Config { action } => run_config(action, &config_path, &overrides),
    }
}

fn run_config(
    action: ConfigAction,
    config_path: &Path,
    overrides: &Overrides,
) -> Result<(), Box<dyn Error>> {
    match action {
        ConfigAction::Show => {
            let config = Config::load_from_path(config_path)?;
            println!("Config file: {}", path_display(config_path));
            config.print_all();
            let resolved = config.resolve(overrides)?;
            println!("Effective settings:");
            println!("  endpoint: {}", resolved.endpoint);
            println!("  model: {}", resolved.model);
            println!("  connect-timeout: {}s", resolved.connect_timeout.as_secs());
            println!("  read-timeout: {}s", resolved.read_timeout.as_secs());
            Ok(())
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                return Err(format!(
                    "{} already exists; pass --force to overwrite it",
                    path_display(config_path)
                )
                .into());
            }
            Config::with_defaults().save_to_path(config_path)?;
            println!("✅ Wrote {}", path_display(config_path));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests;
