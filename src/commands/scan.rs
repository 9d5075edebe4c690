use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::commands::Global;
use crate::domain::git::RepoExt;
use crate::domain::pipeline::Pipeline;
use crate::presentation::table;

#[derive(Debug, Args)]
pub struct Scan {
    /// Repository URL to clone (or reuse) and analyse
    pub url: Option<String>,

    /// Analyse an existing checkout instead of a URL
    #[arg(short, long, conflicts_with = "url")]
    pub path: Option<PathBuf>,

    /// Blame workers (0 = one per core)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Contributor rows to print
    #[arg(long, default_value = "15")]
    pub limit: usize,

    /// Skip display-name resolution
    #[arg(long)]
    pub no_resolve: bool,

    /// JSON output (overrides global --json)
    #[arg(long)]
    pub json: bool,
}

impl super::Runnable for Scan {
    fn run(self, g: &Global) -> Result<()> {
        let mut config = g.config.clone();
        if let Some(t) = self.threads {
            config.threads = t;
        }
        if self.no_resolve {
            config.resolve_names = false;
        }
        let pipeline = Pipeline::from_config(&config).context("cannot load exclusion patterns")?;

        let (label, stat) = match (&self.url, &self.path) {
            (Some(url), _) => (url.clone(), pipeline.analyze_url(url)?),
            (None, Some(path)) => {
                let identity = RepoExt::open(path)?.origin_identity();
                let stat = pipeline.analyze_checkout(path, identity.as_ref())?;
                (path.display().to_string(), stat)
            }
            (None, None) => bail!("give a repository URL or --path"),
        };

        if g.json || self.json {
            println!("{}", serde_json::to_string_pretty(&stat)?);
            return Ok(());
        }

        println!(
            "{label}: {} lines in {} files ({} failed), {} contributors",
            stat.total_lines(),
            stat.files_scanned,
            stat.files_failed,
            stat.contributors.len()
        );
        println!("{}", table::summary(&stat));
        println!("{}", table::contributors(&stat, self.limit));
        if stat.contributors.len() > self.limit {
            let hidden = stat.contributors.len() - self.limit;
            println!("… {hidden} more (use --limit or --json)");
        }
        Ok(())
    }
}
