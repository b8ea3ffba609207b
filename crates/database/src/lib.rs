//! Membank Database Crate
//!
//! Connection sources (direct or pooled), the embedded schema migration, and
//! the member repository.

use membank_config::DatabaseConfig;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;

pub use connection::{connection_url, DataSource, DbConnection, PoolStats};
pub use entities::{Member, UpdateMemberRequest};
pub use migrations::run_migrations;
pub use repos::MemberRepository;
pub use types::{DatabaseError, DatabaseResult};

/// Connect the configured source and bring the schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<DataSource> {
    let source = DataSource::connect(config).await?;
    run_migrations(&source).await?;
    Ok(source)
}
