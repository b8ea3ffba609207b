//! Borrow several connections at once and report what the source handed out.

use anyhow::{Context, Result};
use futures_util::future::try_join_all;
use membank_config::ConnectionStrategy;
use membank_database::{DataSource, PoolStats};
use tracing::info;

#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub strategy: ConnectionStrategy,
    /// Direct connection sequence numbers, in borrow order. Empty when pooled.
    pub connection_ids: Vec<u64>,
    pub borrowed: usize,
    /// Pool occupancy while every probe connection was still held.
    pub stats_while_held: PoolStats,
}

pub async fn probe(source: &DataSource, count: usize) -> Result<ProbeReport> {
    let connections = try_join_all((0..count).map(|_| source.acquire()))
        .await
        .context("failed to borrow probe connections")?;

    for (index, conn) in connections.iter().enumerate() {
        info!(
            index,
            strategy = %conn.strategy(),
            connection = ?conn.id(),
            backend = conn.backend_name(),
            "borrowed connection"
        );
    }

    let stats = source.stats();
    info!(
        total = stats.total,
        active = stats.active,
        idle = stats.idle,
        "pool stats while probe connections are held"
    );

    let connection_ids = connections.iter().filter_map(|conn| conn.id()).collect();

    Ok(ProbeReport {
        strategy: source.strategy(),
        connection_ids,
        borrowed: connections.len(),
        stats_while_held: stats,
    })
}
