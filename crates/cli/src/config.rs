//! Client configuration loading.

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Client configuration.
///
/// Values come from an optional TOML file merged with `HANGAR_`-prefixed
/// environment variables; anything unset falls back to the defaults below.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Root directory of the local blob cache.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Per-layer concurrency cap for ranged chunk requests.
    #[serde(default = "default_max_streams")]
    pub max_streams: usize,
    /// Blob-size floor for the chunked download path.
    #[serde(default = "default_chunking_threshold")]
    pub chunking_threshold: u64,
}

fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".hangar"))
        .unwrap_or_else(|| PathBuf::from("./hangar-data"))
}

fn default_max_streams() -> usize {
    hangar_client::DEFAULT_MAX_STREAMS
}

fn default_chunking_threshold() -> u64 {
    hangar_client::DEFAULT_CHUNKING_THRESHOLD
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            max_streams: default_max_streams(),
            chunking_threshold: default_chunking_threshold(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from an explicit file, the default location, and
    /// the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| dirs::config_dir().map(|dir| dir.join("hangar/config.toml")));

        let mut figment = Figment::new();
        if let Some(path) = path {
            if path.exists() {
                figment = figment.merge(Toml::file(&path));
            }
        }
        figment = figment.merge(Env::prefixed("HANGAR_"));
        Ok(figment.extract()?)
    }
}
