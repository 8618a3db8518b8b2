use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::database::order_repository::OrderState;
use crate::payments::types::CallbackParams;
use crate::services::reconciler::{
    CallbackResolution, FlowOutcome, OrderReconciler, RejectReason,
};

#[derive(Clone)]
pub struct CheckoutState {
    pub reconciler: Arc<OrderReconciler>,
}

#[derive(Debug, Deserialize)]
pub struct RedirectRequest {
    pub order_reference: String,
    #[serde(default)]
    pub preselected_payment_method_id: Option<String>,
}

/// POST /checkout/redirect
///
/// Initiates a payment session and returns either the redirect/form data or
/// a user-facing failure message.
pub async fn initiate_redirect(
    State(state): State<CheckoutState>,
    Json(request): Json<RedirectRequest>,
) -> impl IntoResponse {
    info!(reference = %request.order_reference, "redirect initiation requested");

    let outcome = state
        .reconciler
        .initiate_redirect(
            &request.order_reference,
            request.preselected_payment_method_id.as_deref(),
        )
        .await;

    match outcome {
        Ok(FlowOutcome::Success { data }) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "data": data })),
        )
            .into_response(),
        Ok(FlowOutcome::Failure { message }) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": false, "message": message })),
        )
            .into_response(),
        Err(e) => {
            error!(reference = %request.order_reference, error = %e, "redirect flow failed hard");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "message": e.user_message(),
                })),
            )
                .into_response()
        }
    }
}

/// GET /checkout/callback
///
/// Shopper redirect return from the provider. The response is consumed by
/// the storefront, so failures stay 200 with a user-facing message.
pub async fn handle_callback(
    State(state): State<CheckoutState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let params = CallbackParams::from(params);

    match state.reconciler.reconcile_callback(&params).await {
        Ok(CallbackResolution::Captured { outcome, .. }) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "outcome": outcome })),
        )
            .into_response(),
        Ok(CallbackResolution::Canceled { message, .. }) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": false, "message": message })),
        )
            .into_response(),
        Ok(CallbackResolution::AlreadySettled { state }) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": state == OrderState::Processing,
                "state": state.to_string(),
            })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "callback reconciliation failed");
            (
                StatusCode::from_u16(e.http_status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                Json(serde_json::json!({
                    "success": false,
                    "message": e.user_message(),
                })),
            )
                .into_response()
        }
    }
}

/// POST /checkout/notify
///
/// Provider-initiated server-to-server notification. Same reconciliation
/// path as the redirect return, but the response codes speak the provider's
/// retry protocol: 401 tells it the signature was bad, 200 acknowledges a
/// processed notification (even a failed payment is "processed").
pub async fn handle_notification(
    State(state): State<CheckoutState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let params = CallbackParams::from(params);

    match state.reconciler.reconcile_callback(&params).await {
        Ok(CallbackResolution::Captured { .. }) => {
            (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
        }
        Ok(CallbackResolution::Canceled { reason, .. }) => match reason {
            RejectReason::InvalidSignature => {
                warn!("notification rejected: invalid signature");
                (StatusCode::UNAUTHORIZED, "Invalid signature").into_response()
            }
            RejectReason::MissingField(field) => {
                warn!(field = %field, "notification rejected: unprocessable payload");
                (StatusCode::BAD_REQUEST, "Unprocessable payload").into_response()
            }
            RejectReason::PaymentFailed { .. } => {
                (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
            }
        },
        Ok(CallbackResolution::AlreadySettled { .. }) => {
            (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
        }
        Err(e) => {
            error!(error = %e, "notification reconciliation failed");
            (
                StatusCode::from_u16(e.http_status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                e.user_message(),
            )
                .into_response()
        }
    }
}
