use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use crate::commands::Global;
use crate::domain::pipeline::Pipeline;
use crate::jobs::client::HttpWorkerClient;
use crate::jobs::master::Master as JobMaster;
use crate::jobs::store::JsonDirStore;
use crate::server;
use crate::server::master::MasterState;

#[derive(Debug, Args)]
pub struct Master {
    /// Listen address (default from config, 0.0.0.0:8080)
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Base URL of the worker
    #[arg(long)]
    pub worker_url: Option<String>,

    /// Directory of persisted results
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// Seconds between worker polls
    #[arg(long)]
    pub poll_interval: Option<u64>,
}

impl super::Runnable for Master {
    fn run(self, g: &Global) -> Result<()> {
        let mut config = g.config.clone();
        if let Some(url) = self.worker_url {
            config.worker_url = url;
        }
        if let Some(dir) = self.store_dir {
            config.store_dir = dir;
        }
        if let Some(secs) = self.poll_interval {
            config.poll_interval_secs = secs;
        }
        let addr = self.listen.unwrap_or_else(|| config.master_listen.clone());

        let client = HttpWorkerClient::new(&config.worker_url)
            .with_response_limit(config.worker_response_limit());
        let master = JobMaster::new(
            Arc::new(JsonDirStore::new(&config.store_dir)),
            Arc::new(client),
            config.max_wait(),
        )
        .with_check_batch(config.check_batch);
        let state = MasterState {
            master: Arc::new(master),
            analyzer: Arc::new(
                Pipeline::from_config(&config).context("cannot load exclusion patterns")?,
            ),
        };

        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(server::master::serve(&addr, state, config.poll_interval()))
    }
}
