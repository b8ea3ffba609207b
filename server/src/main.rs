use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use membank_backend_api::{build_router, AppState};
use membank_backend_runtime::{probe::probe, shutdown_signal, telemetry, BackendServices};
use membank_config::{load as load_config, ConnectionStrategy};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "membank-backend")]
#[command(about = "Membank backend (serves HTTP by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Borrow several connections at once and log what the source hands out
    Probe {
        /// Override the configured connection strategy
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
        /// Number of connections held simultaneously
        #[arg(long, default_value_t = 3)]
        count: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Direct,
    Pooled,
}

impl From<StrategyArg> for ConnectionStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Direct => ConnectionStrategy::Direct,
            StrategyArg::Pooled => ConnectionStrategy::Pooled,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing().context("failed to initialise tracing")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server().await,
        Commands::Probe { strategy, count } => run_probe(strategy, count).await,
    }
}

async fn run_server() -> anyhow::Result<()> {
    info!("starting membank backend");

    let config = load_config().context("failed to load configuration")?;

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let app = build_router(AppState::new(services.members.clone()));

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    services.shutdown().await;
    info!("backend shut down");
    Ok(())
}

async fn run_probe(strategy: Option<StrategyArg>, count: usize) -> anyhow::Result<()> {
    let mut config = load_config().context("failed to load configuration")?;
    if let Some(strategy) = strategy {
        config.database.strategy = strategy.into();
    }

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;
    services.source.wait_until_warm().await;

    let report = probe(&services.source, count).await?;
    info!(
        strategy = %report.strategy,
        borrowed = report.borrowed,
        connection_ids = ?report.connection_ids,
        active = report.stats_while_held.active,
        "probe finished"
    );

    services.shutdown().await;
    Ok(())
}
