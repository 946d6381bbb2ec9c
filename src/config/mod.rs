use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Shortest accepted HS256 secret, in bytes
pub const MIN_JWT_SECRET_LEN: usize = 16;

/// Largest accepted gym offset from UTC, in minutes (UTC-18:00 to UTC+18:00)
pub const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub gym: GymConfig,
    #[serde(default)]
    pub demo: DemoConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the identity provider that signs access tokens
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Bearer secret for the cron endpoints. When unset those endpoints answer 503.
    #[serde(default)]
    pub cron_secret: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            cron_secret: None,
        }
    }
}

fn default_jwt_secret() -> String {
    // Random per process; tokens cannot be verified until a real secret is set
    uuid::Uuid::new_v4().to_string()
}

/// Admin API of the external identity provider, used to register members
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
    pub base_url: Option<String>,
    pub service_key: Option<String>,
}

impl IdentityConfig {
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some() && self.service_key.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_requests")]
    pub api_requests_per_window: u32,
    #[serde(default = "default_auth_requests")]
    pub auth_requests_per_window: u32,
    #[serde(default = "default_cron_requests")]
    pub cron_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Seconds between sweeps of expired counters
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_requests_per_window: default_api_requests(),
            auth_requests_per_window: default_auth_requests(),
            cron_requests_per_window: default_cron_requests(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_api_requests() -> u32 {
    100
}

fn default_auth_requests() -> u32 {
    20
}

fn default_cron_requests() -> u32 {
    5
}

fn default_window_seconds() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub email: Option<SmtpConfig>,
    #[serde(default)]
    pub whatsapp: Option<WhatsAppConfig>,
    /// Seconds between outbox polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Rows claimed per outbox poll
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Delivery attempts before a row is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Per-send timeout in seconds
    #[serde(default = "default_send_timeout")]
    pub send_timeout: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            email: None,
            whatsapp: None,
            poll_interval: default_poll_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            send_timeout: default_send_timeout(),
        }
    }
}

fn default_poll_interval() -> u64 {
    15
}

fn default_batch_size() -> u32 {
    25
}

fn default_max_attempts() -> u32 {
    5
}

fn default_send_timeout() -> u64 {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_true")]
    pub smtp_tls: bool,
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Gymflow".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppConfig {
    /// Messages endpoint, e.g. https://graph.facebook.com/v19.0/<phone-number-id>/messages
    pub api_url: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GymConfig {
    /// Offset of the gym's local time from UTC, used for "tomorrow" and expiry dates
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for GymConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemoConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_demo_coach_id")]
    pub coach_id: String,
    #[serde(default = "default_demo_member_id")]
    pub member_id: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            coach_id: default_demo_coach_id(),
            member_id: default_demo_member_id(),
        }
    }
}

fn default_demo_coach_id() -> String {
    "demo-coach".to_string()
}

fn default_demo_member_id() -> String {
    "demo-member".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            identity: IdentityConfig::default(),
            rate_limit: RateLimitConfig::default(),
            notifications: NotificationsConfig::default(),
            gym: GymConfig::default(),
            demo: DemoConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse configuration file")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but would make the server unsafe or wrong
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            anyhow::bail!(
                "auth.jwt_secret must be at least {} bytes long",
                MIN_JWT_SECRET_LEN
            );
        }
        if self.auth.cron_secret.as_deref() == Some("") {
            anyhow::bail!("auth.cron_secret must not be empty; remove it to disable the cron endpoints");
        }
        if self.gym.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            anyhow::bail!(
                "gym.utc_offset_minutes must be between -{0} and {0}, got {1}",
                MAX_UTC_OFFSET_MINUTES,
                self.gym.utc_offset_minutes
            );
        }
        Ok(())
    }
}
