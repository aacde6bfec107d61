//! Client configuration
//!
//! Endpoints and the distribution to browse, loaded from
//! `~/.srccodes/config.toml` (or an explicit path). Every field has a
//! default pointing at the public src.codes services, so an empty or
//! missing file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::pagination::CachePolicy;
use crate::transport::FetchRequest;

/// Directory under the home directory holding user configuration
pub const CONFIG_DIR: &str = ".srccodes";

/// Configuration file name within `CONFIG_DIR`
pub const CONFIG_TOML: &str = "config.toml";

/// Top-level client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// URI scheme of the virtual filesystem
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Distribution slug ("jammy", "bookworm", ...)
    #[serde(default = "default_distribution")]
    pub distribution: String,

    #[serde(default)]
    pub endpoints: Endpoints,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Base URLs of the remote services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default = "default_meta")]
    pub meta: String,
    #[serde(default = "default_ls")]
    pub ls: String,
    #[serde(default = "default_cat")]
    pub cat: String,
    #[serde(default = "default_fzf")]
    pub fzf: String,
    #[serde(default = "default_grep")]
    pub grep: String,
}

/// Pagination cache settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of distinct queries kept; unbounded when absent
    #[serde(default)]
    pub capacity: Option<NonZeroUsize>,
}

impl CacheConfig {
    pub fn policy(&self) -> CachePolicy {
        match self.capacity {
            Some(capacity) => CachePolicy::Lru(capacity),
            None => CachePolicy::Unbounded,
        }
    }
}

fn default_scheme() -> String {
    "srccodes".to_string()
}

fn default_distribution() -> String {
    "jammy".to_string()
}

fn default_meta() -> String {
    "https://meta.src.codes".to_string()
}

fn default_ls() -> String {
    "https://ls.src.codes".to_string()
}

fn default_cat() -> String {
    "https://cat.src.codes".to_string()
}

fn default_fzf() -> String {
    "https://fzf.src.codes".to_string()
}

fn default_grep() -> String {
    "https://grep.src.codes".to_string()
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            meta: default_meta(),
            ls: default_ls(),
            cat: default_cat(),
            fzf: default_fzf(),
            grep: default_grep(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            distribution: default_distribution(),
            endpoints: Endpoints::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Editor URI for a server-relative path, e.g. `srccodes:/jammy/bash/shell.c`
    pub fn file_uri(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}:/{}/{}", self.scheme, self.distribution, path)
    }

    /// Editor URI of the distribution root
    pub fn root_uri(&self) -> String {
        format!("{}:/{}", self.scheme, self.distribution)
    }

    /// `base` joined with one escaped path segment
    pub fn endpoint_url(&self, base: &str, path: &str) -> crate::error::Result<reqwest::Url> {
        FetchRequest::new(base, path).url()
    }
}

/// Default location of the user configuration file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_TOML))
}

/// Load configuration from `path`, or from the default location
///
/// Falls back to defaults if the file doesn't exist. A file that exists but
/// fails to parse is an error.
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => {
                log::debug!("Could not determine home directory, using default config");
                return Ok(ClientConfig::default());
            }
        },
    };

    if !config_path.exists() {
        log::debug!("No config found at {:?}, using defaults", config_path);
        return Ok(ClientConfig::default());
    }

    let config_str = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;

    let config: ClientConfig = toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse {}", config_path.display()))?;

    log::debug!("Loaded config from {:?}: {:?}", config_path, config);
    Ok(config)
}
