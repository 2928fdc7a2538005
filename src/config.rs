use serde::Deserialize;
use std::path::{Path, PathBuf};

// =============================================================================
// Registry-related constants
// =============================================================================

/// Default timeout for a single registry request in milliseconds (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default number of tags requested per page from the tag list endpoint
pub const DEFAULT_TAG_PAGE_SIZE: usize = 100;

/// Upper bound on followed tag list pages, guarding against pagination loops
pub const MAX_TAG_PAGES: usize = 1_000;

/// Delay between starting each discovery in a batch to avoid rate limiting (10ms)
pub const DISCOVERY_STAGGER_DELAY_MS: u64 = 10;

/// Default User-Agent sent to registries
pub const DEFAULT_USER_AGENT: &str = concat!("chart-updates/", env!("CARGO_PKG_VERSION"));

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdatesConfig {
    pub registry: RegistryConfig,
    pub credentials: CredentialsConfig,
}

impl UpdatesConfig {
    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// How registries are contacted
///
/// `insecure_skip_tls_verify` defaults to true so self-hosted registries with
/// self-signed certificates keep working. Set it to false for registries
/// with valid certificates.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    pub insecure_skip_tls_verify: bool,
    /// Talk plain HTTP instead of HTTPS
    pub plain_http: bool,
    pub request_timeout_ms: u64,
    pub tag_page_size: usize,
    pub user_agent: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            insecure_skip_tls_verify: true,
            plain_http: false,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            tag_page_size: DEFAULT_TAG_PAGE_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Where registry credentials are persisted before a chart pull
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Defaults to [`credentials_dir`]
    pub dir: Option<PathBuf>,
}

impl CredentialsConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(credentials_dir)
    }
}

/// Returns the path to the data directory for chart-updates.
/// Uses $XDG_DATA_HOME/chart-updates if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/chart-updates,
/// or ./chart-updates if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the directory holding per-chart registry credentials.
pub fn credentials_dir() -> PathBuf {
    data_dir().join("registry")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("chart-updates.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("chart-updates")
}
