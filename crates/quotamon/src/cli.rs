//! Clap derive structures for the `quotamon` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// quotamon -- model quota monitor for the Antigravity language server
#[derive(Debug, Parser)]
#[command(
    name = "quotamon",
    version,
    about = "Monitor Antigravity model quotas from the command line",
    long_about = "Finds the local Antigravity language server, reads its model quotas,\n\
        and groups them by shared quota pool.\n\n\
        Falls back to an optional remote endpoint, then to the last good snapshot.",
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
    /// Config file to use instead of the platform default
    #[arg(long, env = "QUOTAMON_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Remote quota endpoint (overrides config)
    #[arg(long, global = true)]
    pub remote_url: Option<String>,

    /// Poll interval in seconds, clamped to 10..=3600 (overrides config)
    #[arg(long, global = true)]
    pub interval: Option<u64>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "QUOTAMON_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one line per entry (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch quotas once and print them
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Poll continuously and print every result
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Locate the language server and its working port
    Discover,

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Status / Watch ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// List individual models instead of pools
    #[arg(long)]
    pub flat: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// List individual models instead of pools
    #[arg(long)]
    pub flat: bool,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Seconds between config file change checks
    #[arg(long, default_value = "2", value_name = "SECS")]
    pub reload_every: u64,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (file + environment + flags)
    Show,

    /// Print the config file path
    Path,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Set or clear the display name of a quota pool
    SetGroupName {
        /// Pool id, e.g. claude_pool
        pool: String,

        /// New display name; omit to clear
        name: Option<String>,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
