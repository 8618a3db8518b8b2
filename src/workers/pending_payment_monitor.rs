//! Background sweep for orders stuck awaiting payment.
//!
//! A shopper who abandons the provider's payment page never triggers a
//! callback, so their order would sit in `pending_payment` forever. This
//! worker cancels such orders after a configured age, with the same
//! annotate/cancel/restore side effects as a failed callback.

use crate::database::order_repository::OrderGateway;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

const STALE_PENDING_COMMENT: &str = "Order canceled. Payment was not completed in time.";

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often the worker wakes up to sweep.
    pub poll_interval: Duration,
    /// Orders pending longer than this are canceled.
    pub max_pending_age: Duration,
    /// Maximum number of orders canceled per sweep.
    pub batch_size: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            max_pending_age: Duration::from_secs(3600),
            batch_size: 100,
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(secs) = std::env::var("MONITOR_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            cfg.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = std::env::var("MONITOR_MAX_PENDING_AGE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            cfg.max_pending_age = Duration::from_secs(secs);
        }
        if let Some(batch) = std::env::var("MONITOR_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
        {
            cfg.batch_size = batch;
        }
        cfg
    }
}

pub struct PendingPaymentMonitor {
    orders: Arc<dyn OrderGateway>,
    config: MonitorConfig,
}

impl PendingPaymentMonitor {
    pub fn new(orders: Arc<dyn OrderGateway>, config: MonitorConfig) -> Self {
        Self { orders, config }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            max_pending_age_secs = self.config.max_pending_age.as_secs(),
            "pending payment monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("pending payment monitor stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "pending payment sweep failed");
                    }
                }
            }
        }

        info!("pending payment monitor stopped");
    }

    /// Cancel one batch of stale pending orders. A failure on one order is
    /// logged and does not stop the rest of the batch.
    pub async fn sweep(&self) -> Result<usize, crate::database::error::DatabaseError> {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(self.config.max_pending_age)
                .unwrap_or_else(|_| chrono::Duration::hours(1));

        let stale = self
            .orders
            .find_stale_pending(cutoff, self.config.batch_size)
            .await?;
        if stale.is_empty() {
            return Ok(0);
        }

        let mut canceled = 0;
        for order in stale {
            let result = async {
                self.orders
                    .add_status_comment(order.id, STALE_PENDING_COMMENT)
                    .await?;
                self.orders.cancel(order.id).await?;
                self.orders.restore_cart(&order).await
            }
            .await;

            match result {
                Ok(()) => {
                    info!(order_id = %order.id, reference = %order.reference, "stale pending order canceled");
                    canceled += 1;
                }
                Err(e) => {
                    error!(order_id = %order.id, error = %e, "failed to cancel stale order");
                }
            }
        }

        Ok(canceled)
    }
}
