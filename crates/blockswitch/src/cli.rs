//! Clap derive structures for the `blockswitch` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// blockswitch -- UniFi client blocking as on/off switches
#[derive(Debug, Parser)]
#[command(
    name = "blockswitch",
    version,
    about = "Expose UniFi client blocking as on/off switches",
    long_about = "Keeps one block switch per configured client MAC, in sync with a\n\
        UniFi controller. A switch that is on means the client is blocked.",
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
    /// Configuration file (TOML, or JSON when the name ends in .json)
    #[arg(long, short = 'c', env = "BLOCKSWITCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the switch engine until interrupted
    Run(RunArgs),

    /// Validate the configuration
    Check(CheckArgs),

    /// List the controller's known clients and their block state
    #[command(alias = "ls")]
    Clients(ClientsArgs),

    /// Store the controller password in the system keyring
    SetPassword(SetPasswordArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Copy, Args)]
pub struct RunArgs {
    /// Ignore commands on stdin
    #[arg(long)]
    pub no_console: bool,
}

#[derive(Debug, Clone, Copy, Args)]
pub struct CheckArgs {
    /// Also log in to the controller
    #[arg(long)]
    pub connect: bool,
}

#[derive(Debug, Clone, Copy, Args)]
pub struct ClientsArgs {
    /// Show every known client, not just the configured ones
    #[arg(long, short = 'a')]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct SetPasswordArgs {
    /// Controller username (defaults to the configured one)
    #[arg(long, short = 'u')]
    pub username: Option<String>,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
