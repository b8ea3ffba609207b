use std::fmt;
use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &["membank.toml", "config/membank.toml"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// How the backend obtains database connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStrategy {
    /// Open a fresh physical connection for every unit of work.
    Direct,
    /// Borrow connections from a bounded, pre-warmed pool.
    #[default]
    Pooled,
}

impl ConnectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Pooled => "pooled",
        }
    }
}

impl fmt::Display for ConnectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection settings shared by both connection strategies.
///
/// ```
/// use membank_config::{ConnectionStrategy, DatabaseConfig};
///
/// let database = DatabaseConfig::default();
/// assert_eq!(database.max_connections, 10);
/// assert_eq!(database.strategy, ConnectionStrategy::Pooled);
/// assert!(database.username.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub strategy: ConnectionStrategy,
    pub max_connections: u32,
    #[serde(default = "DatabaseConfig::default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "DatabaseConfig::default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
    #[serde(default = "DatabaseConfig::default_pool_name")]
    pub pool_name: String,
}

impl DatabaseConfig {
    const fn default_min_connections() -> u32 {
        10
    }

    const fn default_acquire_timeout() -> u64 {
        30
    }

    fn default_pool_name() -> String {
        "MembankPool".to_string()
    }

    /// Builds a configuration for `url` with default pool sizing.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_strategy(mut self, strategy: ConnectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the pool capacity, keeping the warm-up target within it.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self.min_connections = self.min_connections.min(max);
        self
    }

    pub fn with_min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn with_acquire_timeout(mut self, secs: u64) -> Self {
        self.acquire_timeout_seconds = secs;
        self
    }

    pub fn with_pool_name(mut self, name: impl Into<String>) -> Self {
        self.pool_name = name.into();
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://membank.db".to_string(),
            username: None,
            password: None,
            strategy: ConnectionStrategy::default(),
            max_connections: 10,
            min_connections: Self::default_min_connections(),
            acquire_timeout_seconds: Self::default_acquire_timeout(),
            pool_name: Self::default_pool_name(),
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use membank_config::load;
///
/// std::env::remove_var("MEMBANK_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let acquire_timeout =
        i64::try_from(defaults.database.acquire_timeout_seconds).unwrap_or(i64::MAX);

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default("database.strategy", defaults.database.strategy.as_str())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default(
            "database.min_connections",
            i64::from(defaults.database.min_connections),
        )?
        .set_default("database.acquire_timeout_seconds", acquire_timeout)?
        .set_default("database.pool_name", defaults.database.pool_name.clone())?;

    let environment_overrides = config::Environment::with_prefix("MEMBANK").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("MEMBANK_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via MEMBANK_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.database.min_connections > config.database.max_connections {
        debug!(
            min = config.database.min_connections,
            max = config.database.max_connections,
            "clamping min_connections to max_connections"
        );
        config.database.min_connections = config.database.max_connections;
    }

    debug!(
        url = %config.database.url,
        strategy = %config.database.strategy,
        max_connections = config.database.max_connections,
        "loaded backend configuration"
    );
    Ok(config)
}
