//! Configuration management for Docshelf
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Where collections and uploaded artifacts live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Sessions, registration and login throttling
    #[serde(default)]
    pub auth: AuthConfig,

    /// Outbound SMTP; confirmation emails are only recorded when absent
    #[serde(default)]
    pub email: Option<EmailConfig>,

    /// External bibliographic lookup
    #[serde(default)]
    pub lookup: LookupConfig,

    /// PDF thumbnail tool
    #[serde(default)]
    pub thumbnail: ThumbnailConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Largest accepted upload body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding `<collection>.json` files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory holding `<id>.pdf` and `<id>.jpg`
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Session cookie name
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Session lifetime in seconds
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Registration link lifetime in seconds
    #[serde(default = "default_confirmation_ttl")]
    pub confirmation_ttl_secs: u64,

    /// Emails that are granted admin on confirmation
    #[serde(default)]
    pub admins: Vec<String>,

    /// Login attempts per second (global)
    #[serde(default = "default_login_rate")]
    pub login_rate_per_second: u32,

    /// Login burst capacity
    #[serde(default = "default_login_burst")]
    pub login_burst: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    /// SMTP server host
    pub smtp_host: String,

    /// SMTP server port (implicit TLS)
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// SMTP username; empty means no authentication
    #[serde(default)]
    pub smtp_user: String,

    /// SMTP password
    #[serde(default)]
    pub smtp_password: String,

    /// From email address
    #[serde(default = "default_from_email")]
    pub from_email: String,

    /// From display name
    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// Public base URL used in confirmation links
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LookupConfig {
    /// Base URL; the identifier is appended as a path segment
    #[serde(default = "default_lookup_base")]
    pub base_url: String,

    /// Accept header sent to the lookup service
    #[serde(default = "default_lookup_accept")]
    pub accept: String,

    /// Request timeout in seconds
    #[serde(default = "default_lookup_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on transport errors and 5xx
    #[serde(default = "default_lookup_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThumbnailConfig {
    /// Render thumbnails after upload
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Executable to invoke (GraphicsMagick by default)
    #[serde(default = "default_thumbnail_command")]
    pub command: String,

    /// Rasterization density (DPI)
    #[serde(default = "default_density")]
    pub density: u32,

    /// Maximum width/height in pixels
    #[serde(default = "default_thumbnail_size")]
    pub size: u32,

    /// JPEG quality
    #[serde(default = "default_quality")]
    pub quality: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level or EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name reported in logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 3000 }
fn default_request_timeout() -> u64 { 60 }
fn default_max_upload_bytes() -> usize { 64 * 1024 * 1024 }
fn default_data_dir() -> PathBuf { PathBuf::from("data/db") }
fn default_artifact_dir() -> PathBuf { PathBuf::from("data/pdf") }
fn default_cookie_name() -> String { "login".to_string() }
fn default_session_ttl() -> u64 { 7 * 24 * 3600 }
fn default_confirmation_ttl() -> u64 { 24 * 3600 }
fn default_login_rate() -> u32 { 5 }
fn default_login_burst() -> u32 { 10 }
fn default_smtp_port() -> u16 { 465 }
fn default_from_email() -> String { "noreply@docshelf.local".to_string() }
fn default_from_name() -> String { "Docshelf".to_string() }
fn default_base_url() -> String { "http://localhost:3000".to_string() }
fn default_lookup_base() -> String { "https://doi.org".to_string() }
fn default_lookup_accept() -> String { "application/x-research-info-systems".to_string() }
fn default_lookup_timeout() -> u64 { 10 }
fn default_lookup_retries() -> u32 { 2 }
fn default_enabled() -> bool { true }
fn default_thumbnail_command() -> String { "gm".to_string() }
fn default_density() -> u32 { 200 }
fn default_thumbnail_size() -> u32 { 1000 }
fn default_quality() -> u32 { 30 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "docshelf".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.admins")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Configuration rooted at a single directory, used by tests and tooling
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut config = Self::default();
        config.storage.data_dir = root.join("db");
        config.storage.artifact_dir = root.join("pdf");
        config
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            artifact_dir: default_artifact_dir(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            session_ttl_secs: default_session_ttl(),
            confirmation_ttl_secs: default_confirmation_ttl(),
            admins: Vec::new(),
            login_rate_per_second: default_login_rate(),
            login_burst: default_login_burst(),
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: default_lookup_base(),
            accept: default_lookup_accept(),
            timeout_secs: default_lookup_timeout(),
            max_retries: default_lookup_retries(),
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            command: default_thumbnail_command(),
            density: default_density(),
            size: default_thumbnail_size(),
            quality: default_quality(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            email: None,
            lookup: LookupConfig::default(),
            thumbnail: ThumbnailConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.auth.cookie_name, "login");
        assert_eq!(config.auth.confirmation_ttl_secs, 86_400);
        assert!(config.email.is_none());
    }

    #[test]
    fn test_thumbnail_defaults() {
        let config = ThumbnailConfig::default();
        assert_eq!(config.density, 200);
        assert_eq!(config.size, 1000);
        assert_eq!(config.quality, 30);
    }

    #[test]
    fn test_with_root() {
        let config = AppConfig::with_root("/srv/shelf");
        assert_eq!(config.storage.data_dir, PathBuf::from("/srv/shelf/db"));
        assert_eq!(config.storage.artifact_dir, PathBuf::from("/srv/shelf/pdf"));
    }
}
