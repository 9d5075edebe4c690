use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::commands::Global;
use crate::domain::blame::{blame_file, BlameParser};
use crate::domain::git::RepoExt;
use crate::presentation::table;

#[derive(Debug, Args)]
pub struct Blame {
    /// File to blame, relative to the repository root
    pub file: String,
    #[arg(short, long, default_value = ".")]
    pub path: PathBuf,
    #[arg(long)]
    pub json: bool,
}

impl super::Runnable for Blame {
    fn run(self, g: &Global) -> Result<()> {
        let repo = RepoExt::open(&self.path)?;
        let record = blame_file(
            &repo.workdir(),
            &self.file,
            &BlameParser::default(),
            g.config.blame_timeout(),
        )
        .with_context(|| format!("cannot blame {}", self.file))?;

        if g.json || self.json {
            println!("{}", serde_json::to_string_pretty(&record)?);
        } else {
            println!("{}: {} lines", record.path, record.total_lines);
            println!("{}", table::file(&record));
        }
        Ok(())
    }
}
