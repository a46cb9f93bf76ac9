use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::capture::browserless::CaptureOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Files,
    Sqlite,
}

/// Runtime settings: built-in defaults, then `adlib.toml` if present, then
/// `ADLIB_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub backend: Backend,
    pub browserless_url: String,
    pub browserless_token: Option<String>,
    pub country: String,
    pub scroll_limit: usize,
    pub max_idle_probes: usize,
    pub scroll_pause_ms: u64,
    pub nav_timeout_secs: u64,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_config(
            Config::builder()
                .add_source(File::with_name("adlib").required(false))
                .add_source(Environment::with_prefix("ADLIB")),
        )
    }

    fn from_config(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        builder
            .set_default("data_dir", "data")?
            .set_default("backend", "files")?
            .set_default("browserless_url", "http://localhost:3000")?
            .set_default("country", "ALL")?
            .set_default("scroll_limit", 200)?
            .set_default("max_idle_probes", 3)?
            .set_default("scroll_pause_ms", 2500)?
            .set_default("nav_timeout_secs", 60)?
            .build()?
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            country: self.country.clone(),
            scroll_limit: self.scroll_limit,
            max_idle_probes: self.max_idle_probes,
            scroll_pause: Duration::from_millis(self.scroll_pause_ms),
            nav_timeout: Duration::from_secs(self.nav_timeout_secs),
        }
    }

    /// The HTTP call must outlive the whole scroll session inside the browser.
    pub fn request_timeout(&self) -> Duration {
        let scrolling = self.scroll_pause_ms.saturating_mul(self.scroll_limit as u64);
        Duration::from_secs(self.nav_timeout_secs) + Duration::from_millis(scrolling) + Duration::from_secs(30)
    }
}
