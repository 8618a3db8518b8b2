//! Order reconciliation against provider payment results.
//!
//! Two flows end here: the redirect initiation that hands the shopper to the
//! provider's hosted form, and the callback evaluation that settles the
//! order once the provider reports back. Every failure exit of either flow
//! lands the order in a canceled, annotated state.

use crate::database::error::DatabaseError;
use crate::database::order_repository::{Order, OrderGateway, OrderState};
use crate::database::transaction_repository::{CaptureRecorder, CaptureTransaction};
use crate::payments::client::CheckoutApi;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::signature;
use crate::payments::types::{
    resolve_method_id, CallbackParams, FormSubmission, PaymentOutcome, RedirectUrls,
    SessionRequest,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const FAILED_PAYMENT_MESSAGE: &str =
    "Failed to complete the payment. Please try again or contact the customer service.";
pub const NO_PAYMENT_METHOD_MESSAGE: &str = "No payment method selected";
pub const GENERIC_FAILURE_MESSAGE: &str = "Unable to process the order. Please try again.";
pub const METHOD_UNAVAILABLE_MESSAGE: &str = "Selected payment method is not available";

const FAILED_PAYMENT_COMMENT: &str = "Failed to complete the payment.";
const REDIRECT_FAILED_COMMENT: &str =
    "Order canceled. Failed to redirect to the payment provider.";

/// Reconciliation states for one payment attempt. Captured and Canceled are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    AwaitingVerification,
    Captured,
    Canceled,
}

impl ReconcileState {
    pub fn valid_transitions(&self) -> &'static [ReconcileState] {
        match self {
            ReconcileState::AwaitingVerification => {
                &[ReconcileState::Captured, ReconcileState::Canceled]
            }
            ReconcileState::Captured | ReconcileState::Canceled => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

/// Why a callback was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Required field absent; the payload is not processable.
    MissingField(&'static str),
    /// Signature did not verify against the shared secret.
    InvalidSignature,
    /// Authentic payload reporting a non-proceed status.
    PaymentFailed { status: String },
}

/// Verdict of the pure callback evaluation: either the payload is trusted
/// and carries a proceed-class outcome, or it is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackVerdict {
    Proceed(PaymentOutcome),
    Reject(RejectReason),
}

/// Evaluate a callback payload without side effects.
///
/// Status classification only happens after the signature verified; an
/// unauthenticated payload is rejected no matter what status it claims.
pub fn evaluate_callback(params: &CallbackParams, secret: &str) -> CallbackVerdict {
    if params.signature().map_or(true, |s| s.trim().is_empty()) {
        return CallbackVerdict::Reject(RejectReason::MissingField("signature"));
    }
    let status = match params.status() {
        Some(status) => status,
        None => return CallbackVerdict::Reject(RejectReason::MissingField("checkout-status")),
    };
    if !signature::verify(params, secret) {
        return CallbackVerdict::Reject(RejectReason::InvalidSignature);
    }

    let outcome = PaymentOutcome::classify(status);
    if outcome.is_proceed() {
        CallbackVerdict::Proceed(outcome)
    } else {
        CallbackVerdict::Reject(RejectReason::PaymentFailed {
            status: status.to_string(),
        })
    }
}

/// How a callback settled the order.
#[derive(Debug)]
pub enum CallbackResolution {
    Captured {
        outcome: PaymentOutcome,
        transaction: CaptureTransaction,
    },
    Canceled {
        reason: RejectReason,
        message: String,
    },
    /// The order already left the awaiting-payment state; the callback is
    /// acknowledged without re-applying any transition.
    AlreadySettled { state: OrderState },
}

impl CallbackResolution {
    pub fn state(&self) -> ReconcileState {
        match self {
            CallbackResolution::Captured { .. } => ReconcileState::Captured,
            CallbackResolution::Canceled { .. } => ReconcileState::Canceled,
            CallbackResolution::AlreadySettled { state } => match state {
                OrderState::Processing => ReconcileState::Captured,
                _ => ReconcileState::Canceled,
            },
        }
    }
}

/// Redirect payload handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RedirectData {
    /// Send the shopper straight to the provider's hosted page.
    ProviderHosted { url: String },
    /// Auto-submit form targeting the selected payment method.
    Form(FormSubmission),
}

/// Structured exit signal of the redirect flow.
#[derive(Debug)]
pub enum FlowOutcome {
    Success { data: RedirectData },
    Failure { message: String },
}

impl FlowOutcome {
    fn failure(message: impl Into<String>) -> Self {
        FlowOutcome::Failure {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Shared secret for callback signature verification.
    pub secret_key: String,
    pub skip_bank_selection: bool,
    pub success_url: String,
    pub cancel_url: String,
    pub language: String,
}

/// Orchestrates payment-session creation, callback verification and order
/// state transitions.
pub struct OrderReconciler {
    orders: Arc<dyn OrderGateway>,
    captures: Arc<dyn CaptureRecorder>,
    checkout: Arc<dyn CheckoutApi>,
    config: ReconcilerConfig,
}

impl OrderReconciler {
    pub fn new(
        orders: Arc<dyn OrderGateway>,
        captures: Arc<dyn CaptureRecorder>,
        checkout: Arc<dyn CheckoutApi>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            orders,
            captures,
            checkout,
            config,
        }
    }

    /// Settle an order from a redirect-return or notification callback.
    ///
    /// Persistence failures propagate after logging; everything else resolves
    /// to a Captured or Canceled state.
    pub async fn reconcile_callback(
        &self,
        params: &CallbackParams,
    ) -> PaymentResult<CallbackResolution> {
        let reference = params
            .reference()
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| {
                warn!("callback without order reference");
                PaymentError::Validation {
                    message: "callback is missing the order reference".to_string(),
                    field: Some("checkout-reference".to_string()),
                }
            })?;

        let order = self
            .orders
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| {
                error!(reference = %reference, "callback for unknown order");
                PaymentError::Validation {
                    message: format!("no order found for reference {}", reference),
                    field: Some("checkout-reference".to_string()),
                }
            })?;

        // A captured or canceled order takes no further transitions. The
        // provider retries notifications and the redirect/notify pair can
        // arrive in either order, so late callbacks are acknowledged as-is
        // instead of re-running the cancel or capture side effects.
        if let Some(state) = order.order_state() {
            if matches!(
                state,
                OrderState::Processing | OrderState::Canceled | OrderState::Closed
            ) {
                info!(
                    order_id = %order.id,
                    state = %state,
                    "callback for settled order acknowledged"
                );
                return Ok(CallbackResolution::AlreadySettled { state });
            }
        }

        match evaluate_callback(params, &self.config.secret_key) {
            CallbackVerdict::Proceed(outcome) => {
                let txn_id = match params.transaction_id().filter(|t| !t.trim().is_empty()) {
                    Some(txn_id) => txn_id,
                    None => {
                        warn!(
                            order_id = %order.id,
                            "authentic callback without provider transaction id"
                        );
                        self.fail_order(&order).await?;
                        return Ok(CallbackResolution::Canceled {
                            reason: RejectReason::MissingField("checkout-transaction-id"),
                            message: FAILED_PAYMENT_MESSAGE.to_string(),
                        });
                    }
                };

                let transaction = self
                    .captures
                    .record_capture(order.id, txn_id, params.to_raw_details())
                    .await?;
                self.orders.set_state(order.id, OrderState::Processing).await?;

                info!(
                    order_id = %order.id,
                    txn_id = %txn_id,
                    outcome = %outcome,
                    "payment captured"
                );
                Ok(CallbackResolution::Captured {
                    outcome,
                    transaction,
                })
            }
            CallbackVerdict::Reject(reason) => {
                match &reason {
                    RejectReason::InvalidSignature => {
                        error!(order_id = %order.id, "callback signature verification failed");
                    }
                    RejectReason::MissingField(field) => {
                        warn!(order_id = %order.id, field = %field, "unprocessable callback payload");
                    }
                    RejectReason::PaymentFailed { status } => {
                        error!(order_id = %order.id, status = %status, "{}", FAILED_PAYMENT_MESSAGE);
                    }
                }
                self.fail_order(&order).await?;
                Ok(CallbackResolution::Canceled {
                    reason,
                    message: FAILED_PAYMENT_MESSAGE.to_string(),
                })
            }
        }
    }

    /// Initiate the redirect to the provider's payment form.
    ///
    /// Every failure exit past order retrieval cancels and annotates the
    /// order and restores the shopper's cart. When the order itself cannot
    /// be loaded there is nothing to cancel; the flow degrades to a logged
    /// generic failure.
    pub async fn initiate_redirect(
        &self,
        order_reference: &str,
        selected_method: Option<&str>,
    ) -> PaymentResult<FlowOutcome> {
        let order = match self.orders.find_by_reference(order_reference).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                error!(reference = %order_reference, "redirect requested for unknown order");
                return Ok(FlowOutcome::failure(GENERIC_FAILURE_MESSAGE));
            }
            Err(e) => {
                error!(reference = %order_reference, error = %e, "order retrieval failed");
                return Ok(FlowOutcome::failure(GENERIC_FAILURE_MESSAGE));
            }
        };

        match self.build_redirect(&order, selected_method).await {
            Ok(data) => Ok(FlowOutcome::Success { data }),
            Err(err) => {
                error!(
                    order_id = %order.id,
                    error = %err,
                    "redirect initiation failed, canceling order"
                );
                self.cancel_after_failed_redirect(&order).await?;
                Ok(FlowOutcome::failure(err.user_message()))
            }
        }
    }

    async fn build_redirect(
        &self,
        order: &Order,
        selected_method: Option<&str>,
    ) -> PaymentResult<RedirectData> {
        let method_id = selected_method
            .and_then(resolve_method_id)
            .ok_or(PaymentError::Validation {
                message: NO_PAYMENT_METHOD_MESSAGE.to_string(),
                field: Some("preselected_payment_method_id".to_string()),
            })?;

        let request = self.session_request_for(order);
        let session = self.checkout.create_session(&request).await?;

        if self.config.skip_bank_selection {
            return Ok(RedirectData::ProviderHosted { url: session.href });
        }

        if !session.has_provider(method_id) {
            return Err(PaymentError::Validation {
                message: METHOD_UNAVAILABLE_MESSAGE.to_string(),
                field: Some("preselected_payment_method_id".to_string()),
            });
        }

        Ok(RedirectData::Form(FormSubmission {
            action: session.form_action(method_id),
            fields: session.form_fields(method_id),
        }))
    }

    fn session_request_for(&self, order: &Order) -> SessionRequest {
        SessionRequest {
            stamp: format!("{}-{}", order.reference, chrono::Utc::now().timestamp()),
            reference: order.reference.clone(),
            amount: order.grand_total,
            currency: order.currency.clone(),
            language: self.config.language.clone(),
            email: order.customer_email.clone(),
            redirect_urls: RedirectUrls {
                success: self.config.success_url.clone(),
                cancel: self.config.cancel_url.clone(),
            },
            callback_urls: None,
        }
    }

    /// Callback failure path: annotate and cancel.
    async fn fail_order(&self, order: &Order) -> PaymentResult<()> {
        self.run_cleanup(order, FAILED_PAYMENT_COMMENT, false).await
    }

    /// Redirect failure path: annotate, cancel, and release the cart so the
    /// shopper can retry.
    async fn cancel_after_failed_redirect(&self, order: &Order) -> PaymentResult<()> {
        self.run_cleanup(order, REDIRECT_FAILED_COMMENT, true).await
    }

    /// Best-effort cleanup: every step is attempted even when an earlier one
    /// fails; the first persistence failure propagates after logging.
    async fn run_cleanup(
        &self,
        order: &Order,
        comment: &str,
        restore_cart: bool,
    ) -> PaymentResult<()> {
        let mut first_failure: Option<DatabaseError> = None;

        if let Err(e) = self.orders.add_status_comment(order.id, comment).await {
            error!(order_id = %order.id, error = %e, "failed to append status comment");
            first_failure.get_or_insert(e);
        }
        if let Err(e) = self.orders.cancel(order.id).await {
            error!(order_id = %order.id, error = %e, "failed to cancel order");
            first_failure.get_or_insert(e);
        }
        if restore_cart {
            if let Err(e) = self.orders.restore_cart(order).await {
                error!(order_id = %order.id, error = %e, "failed to restore cart");
                first_failure.get_or_insert(e);
            }
        }

        match first_failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
