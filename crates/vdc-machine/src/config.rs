use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;
use crate::error::{CliError, Result};

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub storage_path: PathBuf,
    pub async_timeout: Duration,
}

impl CliConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let storage_path = match &cli.storage_path {
            Some(path) => path.clone(),
            None => dirs::home_dir()
                .ok_or(CliError::NoStoragePath)?
                .join(".docker")
                .join("machine"),
        };

        Ok(Self {
            storage_path,
            async_timeout: Duration::from_secs(cli.async_timeout),
        })
    }
}
