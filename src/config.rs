use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    /// Base path of the history service API, e.g. `http://localhost:8000/api/v1`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CaptureConfig {
    /// Address prefixes to treat as non-capturable in addition to
    /// browser-internal schemes (e.g. `https://intranet.`).
    #[serde(default)]
    pub exclude_prefixes: Vec<String>,
}

impl Config {
    /// Minimal in-memory config with every default applied. Test scaffolding
    /// starts from this and overrides the paths it cares about.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/trail.sqlite"),
            },
            remote: RemoteConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.db.path.as_os_str().is_empty() {
        anyhow::bail!("db.path must not be empty");
    }

    if !config.remote.base_url.starts_with("http://") && !config.remote.base_url.starts_with("https://")
    {
        anyhow::bail!(
            "remote.base_url must be an http(s) URL, got '{}'",
            config.remote.base_url
        );
    }

    // Normalize so endpoint paths can be appended directly
    while config.remote.base_url.ends_with('/') {
        config.remote.base_url.pop();
    }

    Ok(config)
}
