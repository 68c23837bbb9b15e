//! `config.toml` under the data directory. Every key is optional.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Pricing, queue and freshness settings.
    #[serde(default)]
    pub tiles: TilesConfig,
    /// Blob buckets.
    #[serde(default)]
    pub blob: BlobConfig,
    /// Downstream publisher.
    #[serde(default)]
    pub publisher: PublisherConfig,
    /// Advanced settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Where the ledger, socket and relative bucket directories live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Empty means `BALDOSA_DATA_DIR`, else `~/.baldosa`.
    #[serde(default)]
    pub data_dir: String,
}

/// Tile marketplace configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TilesConfig {
    /// Price of a free cell, in coins.
    #[serde(default = "default_base_price")]
    pub base_price: u64,
    /// Pending republish tasks kept before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub republish_queue_capacity: usize,
    /// How recently an image must have changed for an edit to be published.
    /// Also the lifetime of presigned upload URLs.
    #[serde(default = "default_freshness_window")]
    pub freshness_window_secs: u64,
    /// Coins granted to new accounts.
    #[serde(default)]
    pub signup_coins: u64,
}

/// Filesystem blob store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Bucket for client image uploads. Relative paths are under the data dir.
    #[serde(default = "default_submitted_dir")]
    pub submitted_dir: String,
    /// Bucket for bitmap snapshots. Relative paths are under the data dir.
    #[serde(default = "default_published_dir")]
    pub published_dir: String,
    /// Base URL presigned upload URLs are built on.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Key material for presigned URL signatures.
    #[serde(default)]
    pub signing_secret: String,
}

/// Downstream publisher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Base address. Empty = publishing disabled.
    #[serde(default)]
    pub addr: String,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub api_key: String,
    /// Request timeout in seconds.
    #[serde(default = "default_publisher_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// One of trace, debug, info, warn, error. `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_base_price() -> u64 {
    baldosa_types::TILE_BASE_PRICE
}

fn default_queue_capacity() -> usize {
    100
}

fn default_freshness_window() -> u64 {
    30 * 60
}

fn default_submitted_dir() -> String {
    "submitted".to_string()
}

fn default_published_dir() -> String {
    "published".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_publisher_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TilesConfig {
    fn default() -> Self {
        Self {
            base_price: default_base_price(),
            republish_queue_capacity: default_queue_capacity(),
            freshness_window_secs: default_freshness_window(),
            signup_coins: 0,
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            submitted_dir: default_submitted_dir(),
            published_dir: default_published_dir(),
            public_base_url: default_public_base_url(),
            signing_secret: String::new(),
        }
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            addr: String::new(),
            api_key: String::new(),
            timeout_secs: default_publisher_timeout(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl TilesConfig {
    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }
}

impl PublisherConfig {
    pub fn enabled(&self) -> bool {
        !self.addr.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DaemonConfig {
    /// Read `config.toml` from the default data directory. A missing file
    /// yields the defaults; an unreadable or invalid one is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content)
                .map_err(|e| anyhow::anyhow!("{}: {e}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse a TOML document. Missing sections and keys take their defaults.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tiles.republish_queue_capacity == 0 {
            anyhow::bail!("tiles.republish_queue_capacity must be at least 1");
        }
        if self.tiles.base_price == 0 {
            anyhow::bail!("tiles.base_price must be positive");
        }
        if !matches!(
            self.advanced.log_level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            anyhow::bail!("unknown advanced.log_level {:?}", self.advanced.log_level);
        }
        Ok(())
    }

    /// Data directory, honouring `storage.data_dir`.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Resolve a bucket directory against the data directory.
    pub fn bucket_dir(&self, dir: &str) -> PathBuf {
        let path = PathBuf::from(dir);
        if path.is_absolute() {
            path
        } else {
            self.data_dir().join(path)
        }
    }

    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Default data directory, overridable with `BALDOSA_DATA_DIR`.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("BALDOSA_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".baldosa"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/baldosa"))
    }
}
