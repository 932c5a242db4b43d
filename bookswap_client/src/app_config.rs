use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
const ENV_PREFIX: &str = "BOOKSWAP";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    pub api_url: String,
    pub session_file: PathBuf,
    pub notifications_poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub jaeger_enabled: bool,
}

impl AppConfig {
    /// Built-in defaults, overridden by `config_file` (TOML, may be missing)
    /// and then by `BOOKSWAP_*` environment variables
    pub fn load(config_file: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_env(config_file, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(config_file: Option<&Path>, env: Environment) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .set_default("api_url", DEFAULT_API_URL)?
            .set_default(
                "session_file",
                default_session_file().to_string_lossy().to_string(),
            )?
            .set_default("notifications_poll_interval_secs", 10_i64)?
            .set_default("request_timeout_secs", 10_i64)?
            .set_default("jaeger_enabled", false)?;

        if let Some(path) = config_file {
            let path = path.to_string_lossy();
            builder = builder.add_source(File::new(&path, FileFormat::Toml).required(false));
        }

        let config: AppConfig = builder
            .add_source(env.try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if config.notifications_poll_interval_secs == 0 {
            anyhow::bail!("notifications_poll_interval_secs must be at least 1");
        }
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.notifications_poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_session_file() -> PathBuf {
    let base = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(".bookswap").join("session.json")
}
