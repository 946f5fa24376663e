//! Postgres persistence for the Tallyhall ledger engine.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - Database migrations
//! - [`PgLedgerStore`], the Postgres implementation of the engine's store

pub mod entities;
pub mod migration;
pub mod store;

pub use store::{PgLedgerStore, PgSession};

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use tallyhall_shared::config::DatabaseConfig;

/// Establishes a connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(database_url).await
}

/// Connects with the pool limits from `config`.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect_with(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .sqlx_logging(false);
    Database::connect(options).await
}
