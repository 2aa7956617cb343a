//! Application configuration for the contributors tools.
//!
//! User config lives at `~/.contributors/contributors.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ContributorsError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "contributors.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".contributors";

// ---------------------------------------------------------------------------
// Config structs (matching contributors.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// `[site]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Public base URL; author profile links are resolved against it.
    #[serde(default = "default_site_url")]
    pub url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            url: default_site_url(),
        }
    }
}

impl SiteConfig {
    /// Parse the base URL, normalized to end in `/` so relative joins append.
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw)
            .map_err(|e| ContributorsError::config(format!("invalid site url '{}': {e}", self.url)))
    }
}

fn default_site_url() -> String {
    "http://localhost/".into()
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file. A leading `~/` expands to the home directory.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl StorageConfig {
    /// Resolve `database_path`, expanding `~/`.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match self.database_path.strip_prefix("~/") {
            Some(rest) => {
                let home = dirs::home_dir()
                    .ok_or_else(|| ContributorsError::config("could not determine home directory"))?;
                Ok(home.join(rest))
            }
            None => Ok(PathBuf::from(&self.database_path)),
        }
    }
}

fn default_database_path() -> String {
    format!("~/{CONFIG_DIR_NAME}/contributors.db")
}

/// `[render]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Avatar edge length in pixels.
    #[serde(default = "default_avatar_size")]
    pub avatar_size: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            avatar_size: default_avatar_size(),
        }
    }
}

fn default_avatar_size() -> u32 {
    150
}

/// How the author archive finds posts a user contributed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// Join the `post_contributors` index maintained on save.
    #[default]
    Index,
    /// Textual containment against the stored assignment record.
    Serialized,
}

/// `[archive]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub match_strategy: MatchStrategy,
}

/// `[security]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Name of the env var holding the anti-forgery secret (never store the secret itself).
    #[serde(default = "default_nonce_secret_env")]
    pub nonce_secret_env: String,

    /// How long an issued form token stays valid.
    #[serde(default = "default_nonce_lifetime")]
    pub nonce_lifetime_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            nonce_secret_env: default_nonce_secret_env(),
            nonce_lifetime_secs: default_nonce_lifetime(),
        }
    }
}

fn default_nonce_secret_env() -> String {
    "CONTRIBUTORS_NONCE_SECRET".into()
}
fn default_nonce_lifetime() -> u64 {
    86_400
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.contributors/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ContributorsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.contributors/contributors.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ContributorsError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ContributorsError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ContributorsError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ContributorsError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ContributorsError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the anti-forgery secret from the configured env var, if set and non-empty.
pub fn nonce_secret_from_env(config: &AppConfig) -> Option<String> {
    std::env::var(&config.security.nonce_secret_env)
        .ok()
        .filter(|val| !val.is_empty())
}
