//! Clap derive structures for the `blaze` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// blaze -- drive a realtime store from a command script
#[derive(Debug, Parser)]
#[command(
    name = "blaze",
    version,
    about = "Replay store and session commands through a blaze driver",
    long_about = "Dispatches a JSON-lines command script through a blaze driver backed\n\
        by the in-memory store, printing one outcome per command and the value\n\
        events of any watched paths.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "BLAZE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format (overrides the config default)
    #[arg(long, short = 'o', env = "BLAZE_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line
    Json,
    /// Indented JSON
    Pretty,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Dispatch a JSON-lines command script
    Run(RunArgs),

    /// Inspect the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Script file, one JSON command per line ("-" reads stdin)
    pub script: PathBuf,

    /// Driver instance (a profile name from the config file)
    #[arg(long, short = 'i', env = "BLAZE_INSTANCE")]
    pub instance: Option<String>,

    /// JSON document loaded into the store before dispatching
    #[arg(long)]
    pub seed: Option<PathBuf>,

    /// Print value events for this path (repeatable)
    #[arg(long, short = 'w')]
    pub watch: Vec<String>,

    /// Only print outcomes of commands in this category
    #[arg(long, short = 'c')]
    pub category: Option<String>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the resolved configuration
    Show,

    /// Store an instance's API key in the system keyring (read from stdin)
    SetKey {
        /// Instance name
        instance: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
