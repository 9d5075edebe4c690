use anyhow::Result;

use crate::cli::Commands;
use crate::config::Config;

#[derive(Debug, Clone, Default)]
pub struct Global {
    /// Global JSON output toggle (overrides per-command flags)
    pub json: bool,
    /// Layered configuration; commands apply their own flags on a clone
    pub config: Config,
}

pub trait Runnable {
    fn run(self, g: &Global) -> Result<()>;
}

pub mod blame;
pub mod master;
pub mod scan;
pub mod token;
pub mod worker;

pub use blame::Blame;
pub use master::Master;
pub use scan::Scan;
pub use token::Token;
pub use worker::Worker;

impl Runnable for Commands {
    fn run(self, g: &Global) -> Result<()> {
        match self {
            Commands::Scan(c) => c.run(g),
            Commands::Blame(c) => c.run(g),
            Commands::Token(c) => c.run(g),
            Commands::Worker(c) => c.run(g),
            Commands::Master(c) => c.run(g),
        }
    }
}
