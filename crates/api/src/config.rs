//! Application configuration.
//!
//! Sources, lowest precedence first: built-in defaults, an optional
//! `configuration.{toml,yaml,json}` file in the working directory, then
//! `APP__`-prefixed environment variables (`APP__SERVER__PORT=9000`,
//! `APP__JWT__SECRET=...`). A `.env` file is loaded into the environment first
//! when present. The loaded values are checked before they are returned.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use bizhub_auth::JwtSettings;
use bizhub_core::TenantId;
use bizhub_observability::LogFormat;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub jwt: JwtSettings,
    pub store: StoreConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(default)]
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Optional first administrator seeded at startup.
///
/// When `admin_user_name` and `admin_email` are both set, startup creates the
/// user in `tenant_id` (a fresh tenant when unset), grants it the Admin role
/// and logs a token for it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[serde(default)]
    pub admin_user_name: Option<String>,
    #[serde(default)]
    pub admin_email: Option<String>,
}

impl BootstrapConfig {
    /// `(user_name, email)` when an administrator is configured.
    pub fn admin(&self) -> Option<(&str, &str)> {
        match (&self.admin_user_name, &self.admin_email) {
            (Some(name), Some(email)) => Some((name.as_str(), email.as_str())),
            _ => None,
        }
    }
}

impl AppConfig {
    /// Load from `.env`, the optional configuration file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let cfg: Self = Self::defaults()?
            .add_source(File::with_name("configuration").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that deserialize fine but cannot be served.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.jwt
            .access_token_lifetime()
            .map_err(|e| ConfigError::Message(format!("jwt.access_token_expire_minutes: {e}")))?;

        let b = &self.bootstrap;
        if b.admin_user_name.is_some() != b.admin_email.is_some() {
            return Err(ConfigError::Message(
                "bootstrap.admin_user_name and bootstrap.admin_email must be set together".into(),
            ));
        }
        Ok(())
    }

    /// Builder pre-filled with every default; callers add their own sources.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("jwt.secret", "")?
            .set_default("store.backend", "memory")?
            .set_default("store.max_connections", 5)
    }

    /// Token settings with the secret resolved.
    ///
    /// An empty secret falls back to an insecure development value.
    pub fn jwt_settings(&self) -> JwtSettings {
        let mut settings = self.jwt.clone();
        if settings.secret.trim().is_empty() {
            tracing::warn!("jwt.secret not set; using insecure dev default");
            settings.secret = DEV_JWT_SECRET.to_string();
        }
        settings
    }
}
