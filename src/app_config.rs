use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::PathBuf;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Origin site settings
    #[serde(default)]
    pub origin: OriginConfig,

    /// Link-resolution pipeline settings
    #[serde(default)]
    pub resolve: ResolveConfig,

    /// Bulk download and archive settings
    #[serde(default)]
    pub bulk: BulkConfig,

    /// Path to the on-disk cookie cache file
    #[serde(default = "default_cookie_cache_path")]
    pub cookie_cache_path: PathBuf,

    /// Path to the SQLite cache store; empty means the default data dir
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Origin site configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OriginConfig {
    /// Base URL of the origin site
    #[serde(default = "default_origin_base_url")]
    pub base_url: String,

    /// Timeout for general origin requests, seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Timeout for catalog probe/page requests, seconds
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// How long to wait for DOM-ready on the landing page, milliseconds.
    /// Hitting this timeout is non-fatal.
    #[serde(default = "default_dom_ready_timeout_ms")]
    pub dom_ready_timeout_ms: u64,

    /// Settle delay after navigation before harvesting cookies, milliseconds
    #[serde(default = "default_landing_settle_ms")]
    pub landing_settle_ms: u64,

    /// Per-page dispatch stagger during catalog pagination, milliseconds
    #[serde(default = "default_page_stagger_ms")]
    pub page_stagger_ms: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: default_origin_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            dom_ready_timeout_ms: default_dom_ready_timeout_ms(),
            landing_settle_ms: default_landing_settle_ms(),
            page_stagger_ms: default_page_stagger_ms(),
        }
    }
}

/// Link-resolution pipeline configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResolveConfig {
    /// Host name of the third-party player referenced by embed pages
    #[serde(default = "default_player_host")]
    pub player_host: String,

    /// Endpoint of the external redirect-resolution service
    #[serde(default = "default_resolver_endpoint")]
    pub resolver_endpoint: String,

    /// Quality marker a download option must carry ("720")
    #[serde(default = "default_preferred_quality")]
    pub preferred_quality: String,

    /// Dub-language marker a download option must not carry ("eng")
    #[serde(default = "default_excluded_audio")]
    pub excluded_audio: String,

    /// Per-stage request timeout, seconds
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            player_host: default_player_host(),
            resolver_endpoint: default_resolver_endpoint(),
            preferred_quality: default_preferred_quality(),
            excluded_audio: default_excluded_audio(),
            stage_timeout_secs: default_stage_timeout_secs(),
        }
    }
}

/// Bulk download and archive configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BulkConfig {
    /// Hard cap on concurrently resolving episodes, independent of range size
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Delay before falling back to the full pipeline for one episode, ms
    #[serde(default = "default_pre_resolve_delay_ms")]
    pub pre_resolve_delay_ms: u64,

    /// Payloads smaller than this are treated as blocked/error pages
    #[serde(default = "default_min_media_bytes")]
    pub min_media_bytes: u64,

    /// Chunk size for streaming assembled archives, bytes
    #[serde(default = "default_archive_chunk_bytes")]
    pub archive_chunk_bytes: usize,

    /// Timeout for fetching one episode's media, seconds
    #[serde(default = "default_media_timeout_secs")]
    pub media_timeout_secs: u64,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            pre_resolve_delay_ms: default_pre_resolve_delay_ms(),
            min_media_bytes: default_min_media_bytes(),
            archive_chunk_bytes: default_archive_chunk_bytes(),
            media_timeout_secs: default_media_timeout_secs(),
        }
    }
}

/// Log level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Map onto the log crate's filter levels
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_origin_base_url() -> String {
    "https://animepahe.si".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_dom_ready_timeout_ms() -> u64 {
    10_000
}

fn default_landing_settle_ms() -> u64 {
    1_000
}

fn default_page_stagger_ms() -> u64 {
    500
}

fn default_player_host() -> String {
    "kwik.cx".to_string()
}

fn default_resolver_endpoint() -> String {
    "https://kwik-test.vercel.app/kwik".to_string()
}

fn default_preferred_quality() -> String {
    "720".to_string()
}

fn default_excluded_audio() -> String {
    "eng".to_string()
}

fn default_stage_timeout_secs() -> u64 {
    10
}

fn default_max_concurrent() -> usize {
    5
}

fn default_pre_resolve_delay_ms() -> u64 {
    500
}

fn default_min_media_bytes() -> u64 {
    100_000
}

fn default_archive_chunk_bytes() -> usize {
    64 * 1024
}

fn default_media_timeout_secs() -> u64 {
    300
}

fn default_cookie_cache_path() -> PathBuf {
    PathBuf::from("origin_cookies.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: OriginConfig::default(),
            resolve: ResolveConfig::default(),
            bulk: BulkConfig::default(),
            cookie_cache_path: default_cookie_cache_path(),
            database_path: None,
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults
    /// when the file does not exist.
    pub fn load_or_default(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to a JSON file
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;
        std::fs::write(path, data)
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.origin.base_url)
            .map_err(|e| anyhow!("Origin base URL is invalid: {}", e))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(anyhow!(
                "Origin base URL must be an http(s) URL: {}",
                self.origin.base_url
            ));
        }
        url::Url::parse(&self.resolve.resolver_endpoint)
            .map_err(|e| anyhow!("Resolver endpoint is invalid: {}", e))?;
        if self.resolve.player_host.is_empty() {
            return Err(anyhow!("Player host must not be empty"));
        }
        if self.bulk.max_concurrent == 0 {
            return Err(anyhow!("Bulk concurrency must be at least 1"));
        }
        if self.bulk.archive_chunk_bytes == 0 {
            return Err(anyhow!("Archive chunk size must be at least 1 byte"));
        }
        Ok(())
    }
}
