use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{Blame, Master, Scan, Token, Worker};

/// Who wrote the lines of a repository, and how recently
#[derive(Parser)]
#[command(
    name = "repocity",
    version,
    about = "Time-bucketed line attribution for git repositories",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Log filter used when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Config file (default: ~/.config/repocity/config.toml)
    #[arg(long, global = true, env = "REPOCITY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyse a repository URL or a local checkout
    Scan(Scan),
    /// Line attribution of a single file
    Blame(Blame),
    /// Normalised identity and dedup token of a URL
    Token(Token),
    /// Run the worker: job queue over HTTP plus a serial consumer
    Worker(Worker),
    /// Run the master: HTTP front end polling a worker
    Master(Master),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["repocity", "token", "https://github.com/a/b", "--json"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Token(_)));
    }
}
