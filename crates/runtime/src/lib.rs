use anyhow::{Context, Result};
use membank_config::AppConfig;
use membank_database::{initialize_database, DataSource, MemberRepository};
use tracing::info;

pub mod probe;

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    /// Install the global fmt subscriber; `RUST_LOG` overrides the `info` default.
    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::DEBUG)
            .with_env_filter(env_filter)
            .with_thread_names(true)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

#[derive(Clone)]
pub struct BackendServices {
    pub source: DataSource,
    pub members: MemberRepository,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let source = initialize_database(&config.database)
            .await
            .with_context(|| format!("failed to initialise database {}", config.database.url))?;

        info!(
            strategy = %source.strategy(),
            pool = %config.database.pool_name,
            "connection source ready"
        );

        let members = MemberRepository::new(source.clone());

        Ok(Self { source, members })
    }

    /// Release pooled connections; direct sources hold nothing.
    pub async fn shutdown(&self) {
        self.source.close().await;
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
