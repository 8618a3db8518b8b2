//! Outbound client for the provider's payment-session API.
//!
//! The API itself is a black box: one POST creates a payment session and
//! returns the selectable payment methods plus a hosted-form URL. Everything
//! order-related stays on our side.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::{PaymentSession, SessionRequest};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

pub const PROVIDER_NAME: &str = "paytrail";

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Merchant account id issued by the provider.
    pub merchant_account: String,
    /// Shared secret for callback signature verification.
    pub secret_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// When set, the shopper is sent straight to the provider's own
    /// method-selection page instead of an embedded form.
    pub skip_bank_selection: bool,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            merchant_account: String::new(),
            secret_key: String::new(),
            base_url: "https://services.paytrail.com".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            skip_bank_selection: false,
        }
    }
}

impl CheckoutConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let merchant_account =
            std::env::var("CHECKOUT_MERCHANT_ACCOUNT").map_err(|_| PaymentError::Validation {
                message: "CHECKOUT_MERCHANT_ACCOUNT environment variable is required".to_string(),
                field: Some("CHECKOUT_MERCHANT_ACCOUNT".to_string()),
            })?;
        let secret_key =
            std::env::var("CHECKOUT_SECRET_KEY").map_err(|_| PaymentError::Validation {
                message: "CHECKOUT_SECRET_KEY environment variable is required".to_string(),
                field: Some("CHECKOUT_SECRET_KEY".to_string()),
            })?;

        Ok(Self {
            merchant_account,
            secret_key,
            base_url: std::env::var("CHECKOUT_API_URL")
                .unwrap_or_else(|_| "https://services.paytrail.com".to_string()),
            timeout_secs: std::env::var("CHECKOUT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("CHECKOUT_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            skip_bank_selection: std::env::var("CHECKOUT_SKIP_BANK_SELECTION")
                .ok()
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(false),
        })
    }

    pub fn validate(&self) -> PaymentResult<()> {
        if self.secret_key.trim().is_empty() {
            return Err(PaymentError::Validation {
                message: "checkout secret key must not be empty".to_string(),
                field: Some("CHECKOUT_SECRET_KEY".to_string()),
            });
        }
        if self.merchant_account.trim().is_empty() {
            return Err(PaymentError::Validation {
                message: "checkout merchant account must not be empty".to_string(),
                field: Some("CHECKOUT_MERCHANT_ACCOUNT".to_string()),
            });
        }
        Ok(())
    }
}

/// Abstract payment-session API, mockable in tests.
#[async_trait]
pub trait CheckoutApi: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> PaymentResult<PaymentSession>;
}

pub struct CheckoutClient {
    config: CheckoutConfig,
    client: Client,
}

impl CheckoutClient {
    pub fn new(config: CheckoutConfig) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaymentError::Provider {
                provider: PROVIDER_NAME.to_string(),
                message: format!("failed to initialize HTTP client: {}", e),
                retryable: false,
            })?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(CheckoutConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> PaymentResult<PaymentSession> {
        let url = self.endpoint(path);
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            let response = self
                .client
                .post(&url)
                .header("checkout-account", &self.config.merchant_account)
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await
                .map_err(|e| PaymentError::Provider {
                    provider: PROVIDER_NAME.to_string(),
                    message: format!("session request failed: {}", e),
                    retryable: true,
                });

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        return serde_json::from_str::<PaymentSession>(&text).map_err(|e| {
                            PaymentError::Provider {
                                provider: PROVIDER_NAME.to_string(),
                                message: format!("invalid session response JSON: {}", e),
                                retryable: false,
                            }
                        });
                    }

                    let retryable = status.is_server_error() || status.as_u16() == 429;
                    if retryable && attempt < self.config.max_retries {
                        warn!(
                            status = %status,
                            attempt = attempt + 1,
                            "provider session request failed, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }

                    return Err(PaymentError::Provider {
                        provider: PROVIDER_NAME.to_string(),
                        message: format!("HTTP {}: {}", status, text),
                        retryable,
                    });
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(PaymentError::Provider {
            provider: PROVIDER_NAME.to_string(),
            message: "session request failed".to_string(),
            retryable: true,
        }))
    }
}

#[async_trait]
impl CheckoutApi for CheckoutClient {
    async fn create_session(&self, request: &SessionRequest) -> PaymentResult<PaymentSession> {
        if request.amount <= 0 {
            return Err(PaymentError::Validation {
                message: "session amount must be greater than zero".to_string(),
                field: Some("amount".to_string()),
            });
        }

        let body = serde_json::to_value(request).map_err(|e| PaymentError::Provider {
            provider: PROVIDER_NAME.to_string(),
            message: format!("failed to serialize session request: {}", e),
            retryable: false,
        })?;

        let session = self.post_json("/payments", &body).await?;
        info!(
            reference = %request.reference,
            transaction_id = %session.transaction_id,
            providers = session.providers.len(),
            "payment session created"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::RedirectUrls;

    fn request(amount: i64) -> SessionRequest {
        SessionRequest {
            stamp: "stamp-1".to_string(),
            reference: "100000001".to_string(),
            amount,
            currency: "EUR".to_string(),
            language: "EN".to_string(),
            email: "shopper@example.com".to_string(),
            redirect_urls: RedirectUrls {
                success: "https://shop.example.com/checkout/callback".to_string(),
                cancel: "https://shop.example.com/checkout/callback".to_string(),
            },
            callback_urls: None,
        }
    }

    #[tokio::test]
    async fn non_positive_amount_is_rejected_before_any_request() {
        let client = CheckoutClient::new(CheckoutConfig {
            merchant_account: "375917".to_string(),
            secret_key: "SAIPPUAKAUPPIAS".to_string(),
            ..CheckoutConfig::default()
        })
        .expect("client init should succeed");

        let err = client
            .create_session(&request(0))
            .await
            .expect_err("zero amount must fail");
        assert!(matches!(err, PaymentError::Validation { .. }));
    }

    #[test]
    fn config_validation_rejects_empty_secret() {
        let config = CheckoutConfig {
            merchant_account: "375917".to_string(),
            secret_key: "  ".to_string(),
            ..CheckoutConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn session_request_serializes_provider_field_names() {
        let json = serde_json::to_value(request(2499)).expect("serialization should succeed");
        assert_eq!(json["amount"], 2499);
        assert!(json.get("redirectUrls").is_some());
        assert!(json.get("callbackUrls").is_none());
    }
}
