use crate::database::error::DatabaseError;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

/// Capture transaction entity. Immutable once created; the closed flag is
/// only flipped later by the order-payment subsystem (void/refund flows)
/// outside this service.
#[derive(Debug, Clone, FromRow)]
pub struct CaptureTransaction {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider_txn_id: String,
    /// Raw provider callback parameters, stored verbatim for audit.
    pub raw_details: serde_json::Value,
    pub is_closed: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Recorder for capture transactions, idempotent per
/// `(order_id, provider_txn_id)`.
#[async_trait]
pub trait CaptureRecorder: Send + Sync {
    /// Record a capture transaction for the order. A second call with the
    /// same provider transaction id returns the already-stored record
    /// instead of creating another one.
    async fn record_capture(
        &self,
        order_id: Uuid,
        provider_txn_id: &str,
        raw_details: serde_json::Value,
    ) -> Result<CaptureTransaction, DatabaseError>;

    async fn find_by_provider_txn(
        &self,
        order_id: Uuid,
        provider_txn_id: &str,
    ) -> Result<Option<CaptureTransaction>, DatabaseError>;
}

const CAPTURE_COLUMNS: &str =
    "id, order_id, provider_txn_id, raw_details, is_closed, created_at";

pub struct CaptureTransactionRepository {
    pool: PgPool,
}

impl CaptureTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CaptureRecorder for CaptureTransactionRepository {
    async fn record_capture(
        &self,
        order_id: Uuid,
        provider_txn_id: &str,
        raw_details: serde_json::Value,
    ) -> Result<CaptureTransaction, DatabaseError> {
        if provider_txn_id.trim().is_empty() {
            return Err(DatabaseError::Constraint(
                "provider transaction id must not be empty".to_string(),
            ));
        }

        // Atomic check-and-insert: the two callback paths (redirect and
        // notification) may run in separate processes, so the in-database
        // unique constraint is the arbiter, not any in-memory state.
        let inserted = sqlx::query_as::<_, CaptureTransaction>(&format!(
            "INSERT INTO capture_transactions \
             (id, order_id, provider_txn_id, raw_details, is_closed) \
             VALUES ($1, $2, $3, $4, FALSE) \
             ON CONFLICT (order_id, provider_txn_id) DO NOTHING \
             RETURNING {}",
            CAPTURE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(provider_txn_id)
        .bind(&raw_details)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        match inserted {
            Some(transaction) => Ok(transaction),
            None => {
                info!(
                    order_id = %order_id,
                    txn_id = %provider_txn_id,
                    "capture transaction already recorded, returning existing"
                );
                self.find_by_provider_txn(order_id, provider_txn_id)
                    .await?
                    .ok_or(DatabaseError::NotFound)
            }
        }
    }

    async fn find_by_provider_txn(
        &self,
        order_id: Uuid,
        provider_txn_id: &str,
    ) -> Result<Option<CaptureTransaction>, DatabaseError> {
        sqlx::query_as::<_, CaptureTransaction>(&format!(
            "SELECT {} FROM capture_transactions \
             WHERE order_id = $1 AND provider_txn_id = $2",
            CAPTURE_COLUMNS
        ))
        .bind(order_id)
        .bind(provider_txn_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
