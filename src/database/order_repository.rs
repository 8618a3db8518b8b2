use crate::database::error::DatabaseError;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Order entity as seen by this service. The surrounding commerce system
/// owns the full order; this core only reads it and requests a closed set
/// of transitions.
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: Uuid,
    /// Merchant order reference echoed back by the provider
    /// (`checkout-reference`).
    pub reference: String,
    pub cart_id: Uuid,
    pub state: String,
    pub grand_total: i64,
    pub currency: String,
    pub customer_email: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Order {
    pub fn order_state(&self) -> Option<OrderState> {
        OrderState::from_db_state(&self.state)
    }
}

/// Order lifecycle states owned by the commerce system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    New,
    PendingPayment,
    Processing,
    Canceled,
    Closed,
}

impl OrderState {
    pub fn from_db_state(state: &str) -> Option<Self> {
        match state {
            "new" => Some(OrderState::New),
            "pending_payment" => Some(OrderState::PendingPayment),
            "processing" => Some(OrderState::Processing),
            "canceled" => Some(OrderState::Canceled),
            "closed" => Some(OrderState::Closed),
            _ => None,
        }
    }

    pub fn to_db_state(self) -> &'static str {
        match self {
            OrderState::New => "new",
            OrderState::PendingPayment => "pending_payment",
            OrderState::Processing => "processing",
            OrderState::Canceled => "canceled",
            OrderState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_state())
    }
}

/// Outbound contract to the order subsystem. The reconciler only ever asks
/// for these operations; everything else about orders stays external.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>, DatabaseError>;

    async fn set_state(&self, order_id: Uuid, state: OrderState) -> Result<(), DatabaseError>;

    /// Cancel the order through the order-management side.
    async fn cancel(&self, order_id: Uuid) -> Result<(), DatabaseError>;

    /// Append an immutable status-history comment to the order's timeline.
    async fn add_status_comment(&self, order_id: Uuid, comment: &str)
        -> Result<(), DatabaseError>;

    /// Reactivate the held cart so the shopper can retry checkout.
    async fn restore_cart(&self, order: &Order) -> Result<(), DatabaseError>;

    /// Orders stuck awaiting payment since before the cutoff.
    async fn find_stale_pending(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, DatabaseError>;
}

const ORDER_COLUMNS: &str = "id, reference, cart_id, state, grand_total, currency, \
     customer_email, created_at, updated_at";

/// Postgres-backed order gateway.
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderGateway for OrderRepository {
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE reference = $1",
            ORDER_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn set_state(&self, order_id: Uuid, state: OrderState) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE orders SET state = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(order_id)
        .bind(state.to_db_state())
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn cancel(&self, order_id: Uuid) -> Result<(), DatabaseError> {
        self.set_state(order_id, OrderState::Canceled).await
    }

    async fn add_status_comment(
        &self,
        order_id: Uuid,
        comment: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO order_status_history (id, order_id, comment) VALUES ($1, $2, $3)",
        )
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(comment)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn restore_cart(&self, order: &Order) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE carts SET is_active = TRUE WHERE id = $1")
            .bind(order.cart_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn find_stale_pending(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders \
             WHERE state = 'pending_payment' AND updated_at < $1 \
             ORDER BY updated_at ASC \
             LIMIT $2",
            ORDER_COLUMNS
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_state_round_trips_db_strings() {
        for state in [
            OrderState::New,
            OrderState::PendingPayment,
            OrderState::Processing,
            OrderState::Canceled,
            OrderState::Closed,
        ] {
            assert_eq!(OrderState::from_db_state(state.to_db_state()), Some(state));
        }
        assert_eq!(OrderState::from_db_state("holded"), None);
    }
}
