use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;

use crate::commands::Global;
use crate::domain::pipeline::Pipeline;
use crate::jobs::cache::ResultCache;
use crate::jobs::worker::WorkerQueue;
use crate::server;

#[derive(Debug, Args)]
pub struct Worker {
    /// Listen address (default from config, 0.0.0.0:7777)
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Blame workers per repository (0 = one per core)
    #[arg(long)]
    pub threads: Option<usize>,
}

impl super::Runnable for Worker {
    fn run(self, g: &Global) -> Result<()> {
        let mut config = g.config.clone();
        if let Some(t) = self.threads {
            config.threads = t;
        }
        let addr = self.listen.unwrap_or_else(|| config.worker_listen.clone());

        let pipeline = Pipeline::from_config(&config).context("cannot load exclusion patterns")?;
        let queue = Arc::new(WorkerQueue::new(
            config.queue_capacity,
            ResultCache::new(config.result_cache_capacity, config.result_ttl()),
        ));

        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(server::worker::serve(&addr, queue, Arc::new(pipeline)))
    }
}
