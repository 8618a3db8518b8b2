//! Postgres access layer.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE orders (
//!     id             UUID PRIMARY KEY,
//!     reference      TEXT NOT NULL UNIQUE,
//!     cart_id        UUID NOT NULL,
//!     state          TEXT NOT NULL,
//!     grand_total    BIGINT NOT NULL,       -- currency minor units
//!     currency       TEXT NOT NULL,
//!     customer_email TEXT NOT NULL,
//!     created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//!
//! CREATE TABLE order_status_history (
//!     id         UUID PRIMARY KEY,
//!     order_id   UUID NOT NULL REFERENCES orders(id),
//!     comment    TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//!
//! CREATE TABLE carts (
//!     id        UUID PRIMARY KEY,
//!     is_active BOOLEAN NOT NULL DEFAULT TRUE
//! );
//!
//! CREATE TABLE capture_transactions (
//!     id               UUID PRIMARY KEY,
//!     order_id         UUID NOT NULL REFERENCES orders(id),
//!     provider_txn_id  TEXT NOT NULL,
//!     raw_details      JSONB NOT NULL,
//!     is_closed        BOOLEAN NOT NULL DEFAULT FALSE,
//!     created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     UNIQUE (order_id, provider_txn_id)
//! );
//! ```
//!
//! The unique constraint on `(order_id, provider_txn_id)` is load-bearing:
//! it is the only duplicate-capture safeguard when the redirect and the
//! server-to-server notification race across processes.

pub mod error;
pub mod order_repository;
pub mod transaction_repository;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

use self::error::DatabaseError;

/// Database pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 5,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Initialize the database connection pool
pub async fn init_pool(
    database_url: &str,
    config: Option<PoolConfig>,
) -> Result<PgPool, DatabaseError> {
    let config = config.unwrap_or_default();

    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "initializing database pool"
    );

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connection_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(|e| DatabaseError::Connection(e.to_string()))
}
