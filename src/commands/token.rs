use anyhow::Result;
use clap::Args;
use serde_json::json;

use crate::commands::Global;
use crate::domain::identity::RepoIdentity;

#[derive(Debug, Args)]
pub struct Token {
    pub url: String,
}

impl super::Runnable for Token {
    fn run(self, g: &Global) -> Result<()> {
        let id = RepoIdentity::parse(&self.url)?;
        let token = id.token();
        if g.json {
            let payload = json!({
                "host": id.host,
                "owner": id.owner,
                "name": id.name,
                "hash": token,
                "path": id.local_path(&g.config.repos_dir),
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        } else {
            println!("{id}  {token}");
        }
        Ok(())
    }
}
