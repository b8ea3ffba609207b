//! Database connection management
//!
//! A [`DataSource`] hands out one [`DbConnection`] per unit of work, either by
//! opening a new physical connection on every call or by borrowing from a
//! bounded pool that is warmed up in the background.

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use membank_config::{ConnectionStrategy, DatabaseConfig};
use sqlx::any::{install_default_drivers, AnyConnectOptions, AnyPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyConnection, AnyPool, Connection};
use tokio::fs;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;

use crate::types::{DatabaseError, DatabaseResult};

const WARM_UP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Snapshot of pool occupancy. Always zero for the direct strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total: u32,
    pub active: u32,
    pub idle: u32,
}

impl PoolStats {
    fn of(pool: &AnyPool) -> Self {
        let total = pool.size();
        let idle = u32::try_from(pool.num_idle()).unwrap_or(total);
        Self {
            total,
            active: total.saturating_sub(idle),
            idle,
        }
    }
}

/// A live connection obtained from a [`DataSource`].
///
/// Dropping it closes a direct connection or returns a pooled one to its pool.
pub enum DbConnection {
    Direct { id: u64, conn: AnyConnection },
    Pooled(PoolConnection<Any>),
}

impl DbConnection {
    pub fn strategy(&self) -> ConnectionStrategy {
        match self {
            Self::Direct { .. } => ConnectionStrategy::Direct,
            Self::Pooled(_) => ConnectionStrategy::Pooled,
        }
    }

    /// Sequence number of a direct connection; `None` for pooled ones.
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Direct { id, .. } => Some(*id),
            Self::Pooled(_) => None,
        }
    }
}

impl Deref for DbConnection {
    type Target = AnyConnection;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Direct { conn, .. } => conn,
            Self::Pooled(conn) => &**conn,
        }
    }
}

impl DerefMut for DbConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Direct { conn, .. } => conn,
            Self::Pooled(conn) => &mut **conn,
        }
    }
}

#[derive(Clone)]
enum Source {
    Direct {
        options: AnyConnectOptions,
        opened: Arc<AtomicU64>,
    },
    Pooled {
        pool: AnyPool,
        name: String,
        warmed: watch::Receiver<bool>,
    },
}

/// Supplies connections bound to a fixed URL and credential set.
#[derive(Clone)]
pub struct DataSource {
    inner: Source,
}

impl DataSource {
    /// Build the connection source described by `config`.
    ///
    /// Never blocks on the network: direct sources connect per call and pooled
    /// sources establish their idle connections on a background task.
    pub async fn connect(config: &DatabaseConfig) -> DatabaseResult<Self> {
        if config.max_connections == 0 {
            return Err(DatabaseError::ValidationError(
                "max_connections must be at least 1".to_string(),
            ));
        }

        install_default_drivers();
        ensure_sqlite_path(&config.url).await?;

        let url = connection_url(config)?;
        let options = AnyConnectOptions::from_str(&url).map_err(DatabaseError::connection)?;

        let source = match config.strategy {
            ConnectionStrategy::Direct => {
                info!(url = %config.url, "using direct connection source");
                Self {
                    inner: Source::Direct {
                        options,
                        opened: Arc::new(AtomicU64::new(0)),
                    },
                }
            }
            ConnectionStrategy::Pooled => Self::pooled(config, options),
        };

        Ok(source)
    }

    fn pooled(config: &DatabaseConfig, options: AnyConnectOptions) -> Self {
        let warm_target = config.min_connections.min(config.max_connections);

        let acquire_timeout = Duration::from_secs(config.acquire_timeout_seconds);

        // Without idle or lifetime limits sqlx opens `min_connections` straight
        // into the idle queue as soon as the pool exists.
        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(warm_target)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_lazy_with(options);

        info!(
            pool = %config.pool_name,
            url = %config.url,
            max_connections = config.max_connections,
            min_connections = warm_target,
            "connection pool created"
        );

        let warmed = spawn_warm_up(
            pool.clone(),
            config.pool_name.clone(),
            warm_target,
            acquire_timeout,
        );

        Self {
            inner: Source::Pooled {
                pool,
                name: config.pool_name.clone(),
                warmed,
            },
        }
    }

    /// Wrap an existing pool without warming it up.
    pub fn from_pool(pool: AnyPool, name: impl Into<String>) -> Self {
        let (_, warmed) = watch::channel(true);
        Self {
            inner: Source::Pooled {
                pool,
                name: name.into(),
                warmed,
            },
        }
    }

    pub fn strategy(&self) -> ConnectionStrategy {
        match &self.inner {
            Source::Direct { .. } => ConnectionStrategy::Direct,
            Source::Pooled { .. } => ConnectionStrategy::Pooled,
        }
    }

    /// The underlying pool, when this source is pooled.
    pub fn pool(&self) -> Option<&AnyPool> {
        match &self.inner {
            Source::Direct { .. } => None,
            Source::Pooled { pool, .. } => Some(pool),
        }
    }

    /// Obtain a connection for one unit of work.
    ///
    /// Pooled sources wait for a released connection once every slot is
    /// borrowed, failing with [`DatabaseError::ConnectionError`] after the
    /// configured acquire timeout.
    pub async fn acquire(&self) -> DatabaseResult<DbConnection> {
        match &self.inner {
            Source::Direct { options, opened } => {
                let id = opened.fetch_add(1, Ordering::Relaxed);
                debug!(connection = id, "creating new direct connection");

                let conn = AnyConnection::connect_with(options).await.map_err(|error| {
                    warn!(connection = id, %error, "failed to open direct connection");
                    DatabaseError::connection(error)
                })?;

                Ok(DbConnection::Direct { id, conn })
            }
            Source::Pooled { pool, name, .. } => {
                let conn = pool.acquire().await.map_err(|error| {
                    warn!(pool = %name, %error, "failed to borrow pooled connection");
                    DatabaseError::connection(error)
                })?;

                Ok(DbConnection::Pooled(conn))
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        match &self.inner {
            Source::Direct { .. } => PoolStats::default(),
            Source::Pooled { pool, .. } => PoolStats::of(pool),
        }
    }

    /// Resolves once the background warm-up task has finished.
    pub async fn wait_until_warm(&self) {
        if let Source::Pooled { warmed, .. } = &self.inner {
            let mut warmed = warmed.clone();
            let _ = warmed.wait_for(|done| *done).await;
        }
    }

    /// Test the database connection
    pub async fn test_connection(&self) -> DatabaseResult<()> {
        let mut conn = self.acquire().await?;
        sqlx::query("SELECT 1").execute(&mut *conn).await?;
        Ok(())
    }

    /// Close the pool; outstanding borrows finish first.
    pub async fn close(&self) {
        if let Source::Pooled { pool, name, .. } = &self.inner {
            pool.close().await;
            info!(pool = %name, "connection pool closed");
        }
    }
}

/// Watch the pool fill up to `target` connections without borrowing any of
/// them, so foreground callers are never queued behind warm-up.
fn spawn_warm_up(
    pool: AnyPool,
    name: String,
    target: u32,
    deadline: Duration,
) -> watch::Receiver<bool> {
    let (done_tx, done_rx) = watch::channel(target == 0);
    if target == 0 {
        return done_rx;
    }

    tokio::spawn(async move {
        let filled = timeout(deadline, async {
            while pool.size() < target && !pool.is_closed() {
                sleep(WARM_UP_POLL_INTERVAL).await;
            }
        })
        .await;

        let stats = PoolStats::of(&pool);
        match filled {
            Ok(()) if !pool.is_closed() => {
                info!(
                    pool = %name,
                    total = stats.total,
                    idle = stats.idle,
                    "pool warm-up complete"
                );
            }
            Ok(()) => debug!(pool = %name, "pool closed during warm-up"),
            Err(_) => {
                warn!(
                    pool = %name,
                    target,
                    total = stats.total,
                    "pool warm-up did not reach its target"
                );
            }
        }
        let _ = done_tx.send(true);
    });

    done_rx
}

/// Resolve the URL handed to the driver, injecting configured credentials
/// into network URLs. SQLite URLs are returned untouched.
pub fn connection_url(config: &DatabaseConfig) -> DatabaseResult<String> {
    if config.url.starts_with("sqlite:")
        || (config.username.is_none() && config.password.is_none())
    {
        return Ok(config.url.clone());
    }

    let mut url = Url::parse(&config.url)
        .map_err(|error| DatabaseError::connection(format!("invalid database url: {error}")))?;

    if let Some(username) = &config.username {
        url.set_username(username).map_err(|_| {
            DatabaseError::connection("database url does not accept a username")
        })?;
    }

    if let Some(password) = &config.password {
        url.set_password(Some(password)).map_err(|_| {
            DatabaseError::connection("database url does not accept a password")
        })?;
    }

    Ok(url.to_string())
}

/// Ensure the SQLite database file and directory exist
async fn ensure_sqlite_path(url: &str) -> DatabaseResult<()> {
    let Some(rest) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };

    let sqlite_path = rest.split('?').next().unwrap_or(rest);
    if sqlite_path.is_empty() || sqlite_path == ":memory:" {
        return Ok(());
    }

    let path = Path::new(sqlite_path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.map_err(|error| {
                DatabaseError::connection(format!(
                    "failed to create sqlite directory {}: {error}",
                    parent.display()
                ))
            })?;
        }
    }

    if fs::metadata(path).await.is_err() {
        fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .await
            .map_err(|error| {
                DatabaseError::connection(format!(
                    "failed to create sqlite database file {}: {error}",
                    path.display()
                ))
            })?;
    }

    Ok(())
}
