use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repocity::cli::Cli;
use repocity::commands::{Global, Runnable};
use repocity::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level; logs go to stderr so --json stays clean
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let g = Global {
        json: cli.json,
        config: Config::load(cli.config.as_deref())?,
    };
    cli.command.run(&g)
}
