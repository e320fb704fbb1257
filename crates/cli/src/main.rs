mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::OutputFormat;

/// cfgsync - inspect and watch settings files
#[derive(Parser)]
#[command(name = "cfgsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// List every setting of a settings file
  Show {
    /// Path to the settings file
    file: PathBuf,
  },

  /// Print the raw value of one setting
  Get {
    /// Path to the settings file
    file: PathBuf,

    /// Section the setting belongs to
    section: String,

    /// Key of the setting
    key: String,
  },

  /// Poll a settings file and print values as they change
  Watch {
    /// Path to the settings file
    file: PathBuf,

    /// Time between checks, e.g. 10s or 500ms (default: $CFGSYNC_POLL_INTERVAL or 10s)
    #[arg(short, long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// Stop after this many checks instead of running until interrupted
    #[arg(long)]
    max_polls: Option<u64>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Show { file } => cmd::cmd_show(&file, cli.output),
    Commands::Get { file, section, key } => cmd::cmd_get(&file, &section, &key, cli.output),
    Commands::Watch {
      file,
      interval,
      max_polls,
    } => cmd::cmd_watch(&file, interval, max_polls, cli.output),
  }
}
