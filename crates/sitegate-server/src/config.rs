use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use sitegate_auth::config::AuthConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub roles: RolesConfig,
    /// Accounts loaded into the account store at startup.
    #[serde(default)]
    pub accounts: Vec<SeedAccount>,
}

impl AppConfig {
    pub fn addr(&self) -> SocketAddr {
        let ip = self
            .server
            .host
            .parse()
            .unwrap_or(std::net::IpAddr::from([0, 0, 0, 0]));
        SocketAddr::new(ip, self.server.port)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.host.parse::<std::net::IpAddr>().is_err() {
            return Err(format!(
                "server.host must be an IP address, got '{}'",
                self.server.host
            ));
        }
        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(format!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            ));
        }

        self.auth.validate().map_err(|e| e.to_string())?;

        let mut names = std::collections::HashSet::new();
        for provider in &self.roles.providers {
            if provider.name.trim().is_empty() {
                return Err("roles.providers[].name must not be empty".into());
            }
            if !names.insert(provider.name.as_str()) {
                return Err(format!(
                    "roles.providers contains '{}' more than once",
                    provider.name
                ));
            }
        }

        let mut usernames = std::collections::HashSet::new();
        for account in &self.accounts {
            if account.username.trim().is_empty() {
                return Err("accounts[].username must not be empty".into());
            }
            if !usernames.insert(account.username.as_str()) {
                return Err(format!(
                    "accounts contains '{}' more than once",
                    account.username
                ));
            }
            if account.external_id.is_some() != account.external_provider_name.is_some() {
                return Err(format!(
                    "accounts '{}': external_id and external_provider_name must be set together",
                    account.username
                ));
            }
        }
        Ok(())
    }

    /// Renders the configuration as TOML with the shared secret masked.
    pub fn to_redacted_toml(&self) -> Result<String, String> {
        let mut redacted = self.clone();
        if !redacted.auth.external.shared_secret.is_empty() {
            redacted.auth.external.shared_secret = "<redacted>".into();
        }
        toml::to_string_pretty(&redacted).map_err(|e| format!("config render error: {e}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Role providers, in precedence order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolesConfig {
    #[serde(default)]
    pub providers: Vec<RoleProviderSeed>,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            providers: vec![RoleProviderSeed {
                name: "Default".to_string(),
                roles: vec![
                    "Administrators".to_string(),
                    "BackendUsers".to_string(),
                    "Users".to_string(),
                ],
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleProviderSeed {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedAccount {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Role names, resolved through the role providers.
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub backend_user: bool,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub external_provider_name: Option<String>,
}

fn default_true() -> bool {
    true
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file name.
    pub const DEFAULT_CONFIG_FILE: &str = "sitegate.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., SITEGATE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("SITEGATE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
