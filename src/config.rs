/// Configuration management for the identity sync core
use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main configuration supplied by the embedding application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub storage: StorageConfig,
    pub gateways: GatewayListConfig,
    pub resolver: ResolverConfig,
    pub rate_limit: RateLimitConfig,
    pub encryption: EncryptionConfig,
    pub device: DeviceConfig,
    pub logging: LoggingConfig,
}

/// Local storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub records_db: PathBuf,
}

/// Content-addressed storage gateway lists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayListConfig {
    /// Gateways the upload fan-out races against
    pub upload: Vec<GatewayEntry>,
    /// Gateways tried sequentially on download, in priority order
    pub download: Vec<GatewayEntry>,
    /// Per-request upload timeout in seconds
    pub upload_timeout: u64,
    /// Per-request download timeout in seconds
    pub download_timeout: u64,
}

/// A single configured gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEntry {
    pub name: String,
    pub url: String,
}

/// DID resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Resolution cache TTL in seconds
    pub cache_ttl: u64,
    /// Timeout for did:web document fetches in seconds
    pub web_timeout: u64,
    /// Rate limit applied per resolution subject
    pub rate_limit_per_window: u32,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length in seconds
    pub window: u64,
    /// Operations allowed per identifier per window
    pub max_operations: u32,
}

/// Key derivation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// PBKDF2-HMAC-SHA512 iteration count
    pub kdf_iterations: u32,
}

/// Per-device identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_id: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                records_db: PathBuf::from("./data/identity.sqlite"),
            },
            gateways: GatewayListConfig::default(),
            resolver: ResolverConfig::default(),
            rate_limit: RateLimitConfig::default(),
            encryption: EncryptionConfig::default(),
            device: DeviceConfig {
                device_id: uuid::Uuid::new_v4().to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for GatewayListConfig {
    fn default() -> Self {
        Self {
            upload: vec![
                GatewayEntry {
                    name: "local".to_string(),
                    url: "http://127.0.0.1:5001".to_string(),
                },
                GatewayEntry {
                    name: "infura".to_string(),
                    url: "https://ipfs.infura.io:5001".to_string(),
                },
            ],
            download: vec![
                GatewayEntry {
                    name: "ipfs.io".to_string(),
                    url: "https://ipfs.io".to_string(),
                },
                GatewayEntry {
                    name: "dweb.link".to_string(),
                    url: "https://dweb.link".to_string(),
                },
                GatewayEntry {
                    name: "cloudflare".to_string(),
                    url: "https://cloudflare-ipfs.com".to_string(),
                },
            ],
            upload_timeout: 10,
            download_timeout: 8,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: 300,
            web_timeout: 8,
            rate_limit_per_window: 10,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: 60,
            max_operations: 5,
        }
    }
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: 1_000_000,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> SyncResult<Self> {
        dotenv::dotenv().ok();

        let data_directory: PathBuf = env::var("IDSYNC_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let records_db = env::var("IDSYNC_RECORDS_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("identity.sqlite"));

        let upload = parse_gateway_list(
            &env::var("IDSYNC_UPLOAD_GATEWAYS").unwrap_or_default(),
            GatewayListConfig::default().upload,
        );
        let download = parse_gateway_list(
            &env::var("IDSYNC_DOWNLOAD_GATEWAYS").unwrap_or_default(),
            GatewayListConfig::default().download,
        );
        let upload_timeout = env::var("IDSYNC_UPLOAD_TIMEOUT")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let download_timeout = env::var("IDSYNC_DOWNLOAD_TIMEOUT")
            .unwrap_or_else(|_| "8".to_string())
            .parse()
            .unwrap_or(8);

        let cache_ttl = env::var("IDSYNC_CACHE_TTL")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .unwrap_or(300);
        let web_timeout = env::var("IDSYNC_WEB_TIMEOUT")
            .unwrap_or_else(|_| "8".to_string())
            .parse()
            .unwrap_or(8);
        let resolver_limit = env::var("IDSYNC_RESOLVER_RATE_LIMIT")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let window = env::var("IDSYNC_RATE_LIMIT_WINDOW")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .unwrap_or(60);
        let max_operations = env::var("IDSYNC_RATE_LIMIT_MAX")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        let kdf_iterations = env::var("IDSYNC_KDF_ITERATIONS")
            .unwrap_or_else(|_| "1000000".to_string())
            .parse()
            .unwrap_or(1_000_000);

        let device_id = env::var("IDSYNC_DEVICE_ID")
            .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(SyncConfig {
            storage: StorageConfig {
                data_directory,
                records_db,
            },
            gateways: GatewayListConfig {
                upload,
                download,
                upload_timeout,
                download_timeout,
            },
            resolver: ResolverConfig {
                cache_ttl,
                web_timeout,
                rate_limit_per_window: resolver_limit,
            },
            rate_limit: RateLimitConfig {
                window,
                max_operations,
            },
            encryption: EncryptionConfig { kdf_iterations },
            device: DeviceConfig { device_id },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> SyncResult<()> {
        if self.gateways.upload.is_empty() {
            return Err(SyncError::Validation(
                "At least one upload gateway is required".to_string(),
            ));
        }

        if self.gateways.download.is_empty() {
            return Err(SyncError::Validation(
                "At least one download gateway is required".to_string(),
            ));
        }

        if self.rate_limit.window == 0 {
            return Err(SyncError::Validation(
                "Rate limit window cannot be zero".to_string(),
            ));
        }

        // Below ~100k iterations the KDF no longer meaningfully slows
        // offline guessing
        if self.encryption.kdf_iterations < 100_000 {
            return Err(SyncError::Validation(
                "KDF iteration count must be at least 100000".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse a comma-separated list of `name=url` pairs (bare URLs allowed,
/// named after their host)
fn parse_gateway_list(raw: &str, fallback: Vec<GatewayEntry>) -> Vec<GatewayEntry> {
    let entries: Vec<GatewayEntry> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| match s.split_once('=') {
            Some((name, url)) => GatewayEntry {
                name: name.trim().to_string(),
                url: url.trim().trim_end_matches('/').to_string(),
            },
            None => GatewayEntry {
                name: s
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .split(['/', ':'])
                    .next()
                    .unwrap_or(s)
                    .to_string(),
                url: s.trim_end_matches('/').to_string(),
            },
        })
        .collect();

    if entries.is_empty() {
        fallback
    } else {
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_gateways_rejected() {
        let mut config = SyncConfig::default();
        config.gateways.upload.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_weak_kdf_rejected() {
        let mut config = SyncConfig::default();
        config.encryption.kdf_iterations = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_named_gateway_list() {
        let parsed = parse_gateway_list("pinata=https://api.pinata.cloud", vec![]);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "pinata");
        assert_eq!(parsed[0].url, "https://api.pinata.cloud");
    }

    #[test]
    fn test_parse_bare_gateway_list() {
        let parsed = parse_gateway_list("https://ipfs.io/, https://dweb.link", vec![]);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name, "ipfs.io");
        assert_eq!(parsed[0].url, "https://ipfs.io");
        assert_eq!(parsed[1].name, "dweb.link");
    }

    #[test]
    fn test_parse_empty_falls_back() {
        let fallback = GatewayListConfig::default().download;
        let parsed = parse_gateway_list("", fallback.clone());
        assert_eq!(parsed.len(), fallback.len());
    }
}
