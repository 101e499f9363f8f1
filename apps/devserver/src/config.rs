//! Dev server configuration.
//!
//! Read from `devserver.toml` in the working directory (or the path given as
//! the first argument). A missing file means defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use liverefresh_server::LiveRefreshConfig;

/// Default config file name.
pub const DEFAULT_CONFIG_FILE: &str = "devserver.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory served over HTTP.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Paths watched for changes. Empty means `root`.
    #[serde(default)]
    pub watch: Vec<PathBuf>,

    /// Quiet period after the last change before a refresh is sent.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default)]
    pub live_refresh: LiveRefreshConfig,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8080
}

fn default_root() -> PathBuf {
    PathBuf::from("public")
}

fn default_debounce_ms() -> u64 {
    100
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            root: default_root(),
            watch: Vec::new(),
            debounce_ms: default_debounce_ms(),
            live_refresh: LiveRefreshConfig::default(),
        }
    }
}

impl DevServerConfig {
    /// Loads configuration from `path`, falling back to defaults if the
    /// file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.live_refresh.validate()?;
        Ok(config)
    }

    /// Paths to watch for changes.
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        if self.watch.is_empty() {
            vec![self.root.clone()]
        } else {
            self.watch.clone()
        }
    }
}
