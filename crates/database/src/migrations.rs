//! Database migrations

use tracing::info;

use crate::connection::DataSource;
use crate::types::{DatabaseError, DatabaseResult};

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Apply the embedded schema over a single connection from `source`.
pub async fn run_migrations(source: &DataSource) -> DatabaseResult<()> {
    let mut conn = source.acquire().await?;
    MIGRATOR
        .run(&mut *conn)
        .await
        .map_err(|e| DatabaseError::storage("database migrations failed", e))?;
    info!(strategy = %source.strategy(), "database migrations applied");
    Ok(())
}
