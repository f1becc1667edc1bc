use anyhow::{Context, Result};
use config::{Config, Environment, File};
use log::debug;
use serde::Deserialize;
use std::time::Duration;

use crate::client::HttpRemote;
use crate::remote::{RemotePredictions, Unconfigured};
use crate::store::DEFAULT_PAGE_SIZE;

pub const DEFAULT_CONFIG_FILE: &str = "prophecy";
const ENV_PREFIX: &str = "PROPHECY";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub remote_url: Option<String>,
    pub api_key: Option<String>,
    pub page_size: usize,
    /// No timeout unless set
    pub remote_timeout_ms: Option<u64>,
    pub leaderboard_size: usize,
}
impl Settings {
    /// Defaults, then `<file>.toml` if present, then `PROPHECY_*` variables.
    pub fn load(file: &str) -> Result<Self> {
        let settings = Config::builder()
            .set_default("page_size", DEFAULT_PAGE_SIZE as u64)?
            .set_default("leaderboard_size", 50)?
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .context("couldn't read settings")?
            .try_deserialize::<Settings>()
            .context("invalid settings")?;
        debug!("Loaded settings {:?}", settings.redacted());
        Ok(settings)
    }
    fn redacted(&self) -> Self {
        Self {
            api_key: self.api_key.as_ref().map(|_| "***".to_string()),
            ..self.clone()
        }
    }
    pub fn is_configured(&self) -> bool {
        self.remote_url
            .as_ref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }
    /// The remote to sync with, or one that is always unavailable when no
    /// url is configured.
    pub fn remote(&self) -> Result<Box<dyn RemotePredictions + Send + Sync>> {
        let url = match &self.remote_url {
            Some(url) if self.is_configured() => url.clone(),
            _ => {
                debug!("No remote url configured, working offline");
                return Ok(Box::new(Unconfigured));
            }
        };
        let remote = match self.remote_timeout_ms {
            Some(ms) => {
                HttpRemote::with_timeout(url, self.api_key.clone(), Duration::from_millis(ms))?
            }
            None => HttpRemote::new(url, self.api_key.clone()),
        };
        Ok(Box::new(remote))
    }
}
