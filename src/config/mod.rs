use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Shortest signing secret accepted at startup.
pub const MIN_SECRET_LENGTH: usize = 32;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Symmetric key for session and challenge tokens. Has no default.
    pub session_secret: String,
    pub session_ttl_days: i64,
    pub challenge_ttl_minutes: i64,
    pub refresh_after_minutes: i64,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub bootstrap_username: Option<String>,
    pub bootstrap_password: Option<String>,
    pub bootstrap_display_name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitSettings {
    pub max_attempts: u32,
    pub window_minutes: i64,
    pub sweep_threshold: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TotpConfig {
    pub issuer: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitSettings,
    pub totp: TotpConfig,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Self::defaults(Config::builder())?
            .set_default("environment", "development")?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.url", "sqlite://crm.db")?
            .set_default("database.max_connections", 5)?

            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))

            // Add in settings from environment variables (with prefix "APP_")
            // E.g., `APP_AUTH__SESSION_SECRET=...` would set `Settings.auth.session_secret`
            .add_source(
                Environment::with_prefix("app")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Settings for tests: an in-memory database, a fixed secret and cheap
    /// password hashing. Environment variables still override.
    pub fn new_for_test() -> Result<Self, ConfigError> {
        let settings: Settings = Self::defaults(Config::builder())?
            .set_default("environment", "test")?
            .set_default("server.workers", 1)?
            .set_default("database.url", "sqlite::memory:")?
            // In-memory SQLite is per connection.
            .set_default("database.max_connections", 1)?
            .set_default("auth.session_secret", "test-session-secret-0123456789abcdef")?
            .set_default("auth.argon2_memory_kib", 64)?
            .set_default("auth.argon2_iterations", 1)?
            .add_source(
                Environment::with_prefix("app")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    fn defaults(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        builder
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("auth.session_ttl_days", 7)?
            .set_default("auth.challenge_ttl_minutes", 5)?
            .set_default("auth.refresh_after_minutes", 60)?
            .set_default("auth.argon2_memory_kib", 19_456)?
            .set_default("auth.argon2_iterations", 2)?
            .set_default("rate_limit.max_attempts", 10)?
            .set_default("rate_limit.window_minutes", 15)?
            .set_default("rate_limit.sweep_threshold", 10_000)?
            .set_default("totp.issuer", "CRM Dashboard")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.session_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::Message(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if !(1..=7).contains(&self.auth.session_ttl_days) {
            return Err(ConfigError::Message(
                "auth.session_ttl_days must be between 1 and 7".into(),
            ));
        }
        if !(1..=5).contains(&self.auth.challenge_ttl_minutes) {
            return Err(ConfigError::Message(
                "auth.challenge_ttl_minutes must be between 1 and 5".into(),
            ));
        }
        if self.auth.refresh_after_minutes < 1 {
            return Err(ConfigError::Message(
                "auth.refresh_after_minutes must be at least 1".into(),
            ));
        }
        if self.rate_limit.max_attempts == 0 {
            return Err(ConfigError::Message("rate_limit.max_attempts must be positive".into()));
        }
        if self.rate_limit.window_minutes < 1 {
            return Err(ConfigError::Message(
                "rate_limit.window_minutes must be at least 1".into(),
            ));
        }
        if self.rate_limit.sweep_threshold == 0 {
            return Err(ConfigError::Message(
                "rate_limit.sweep_threshold must be positive".into(),
            ));
        }
        Ok(())
    }
}
