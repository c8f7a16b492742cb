use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Runtime knobs. Layered: built-in defaults, then `civic_scrapers.toml`
/// in the working directory (optional), then `CIVIC_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Settings {
    pub fn load() -> Result<Self> {
        config::Config::builder()
            .set_default("db_path", "data/meetings.sqlite")?
            .set_default("user_agent", DEFAULT_USER_AGENT)?
            .set_default("timeout_secs", 30)?
            .set_default("max_retries", 3)?
            .add_source(config::File::with_name("civic_scrapers").required(false))
            .add_source(config::Environment::with_prefix("CIVIC"))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }
}
