use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
///
/// This gets loaded from config file and env vars.
/// Priority: Env > File > Defaults (like a sensible person would do)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub ebay: EbayConfig,
    pub rate: RateConfig,
    pub crawl: CrawlConfig,
}

impl Config {
    /// Load config from default location or fall back to defaults
    pub fn load() -> crate::Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            let mut config: Config = toml::from_str(&contents)
                .map_err(|e| crate::Error::ConfigError(format!("Failed to parse config: {}", e)))?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            // No config file? Use defaults, creds may still come from env
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Save config to disk
    pub fn save(&self) -> crate::Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&config_path, contents)?;
        Ok(())
    }

    /// Credentials from the environment win over the file - keeps secrets
    /// out of dotfiles for people who care
    fn apply_env_overrides(&mut self) {
        if let Ok(app_id) = std::env::var("DEALSCOUT_APP_ID") {
            self.ebay.app_id = app_id;
        }
        if let Ok(cert_id) = std::env::var("DEALSCOUT_CERT_ID") {
            self.ebay.cert_id = cert_id;
        }
    }

    /// Get the config file path
    /// Uses XDG on Linux/macOS, AppData on Windows
    fn config_path() -> crate::Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| crate::Error::ConfigError("Could not find config directory".into()))?
            .join("dealscout");

        Ok(config_dir.join("config.toml"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EbayConfig {
    /// Application id (client id) from the developer portal
    pub app_id: String,
    /// Certificate id (client secret) from the developer portal
    pub cert_id: String,

    /// Marketplace the searches run against
    #[serde(default = "default_marketplace")]
    pub marketplace: String,

    /// Browse API base (sandbox overrides this)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// OAuth token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Developer analytics base, used for quota lookups
    #[serde(default = "default_analytics_url")]
    pub analytics_url: String,
}

fn default_marketplace() -> String {
    "EBAY_US".to_string()
}

fn default_base_url() -> String {
    "https://api.ebay.com/buy/browse/v1".to_string()
}

fn default_token_url() -> String {
    "https://api.ebay.com/identity/v1/oauth2/token".to_string()
}

fn default_analytics_url() -> String {
    "https://api.ebay.com/developer/analytics/v1_beta".to_string()
}

impl Default for EbayConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            cert_id: String::new(),
            marketplace: default_marketplace(),
            base_url: default_base_url(),
            token_url: default_token_url(),
            analytics_url: default_analytics_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    /// Steady outbound call rate
    #[serde(default = "default_per_second")]
    pub per_second: u32,

    /// Token-bucket burst size
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Hard rolling 24h call ceiling
    #[serde(default = "default_max_daily")]
    pub max_daily: u64,
}

fn default_per_second() -> u32 {
    2
}

fn default_burst() -> u32 {
    5
}

fn default_max_daily() -> u64 {
    5000
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            per_second: default_per_second(),
            burst: default_burst(),
            max_daily: default_max_daily(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Page budget per crawl; first runs are capped lower regardless
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_page_size() -> u32 {
    50
}

fn default_max_pages() -> u32 {
    20
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}
