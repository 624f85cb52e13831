use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use marquee_core::PaymentOutcome;
use marquee_shared::Booking;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
/// Payment gateway reports succeeded / failed / refunded for a booking.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PaymentOutcome>,
) -> Result<Json<Booking>, AppError> {
    if let Some(expected) = state.auth.webhook_secret.as_deref() {
        let provided = headers.get("X-Webhook-Secret").and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            return Err(AppError::Unauthorized("bad webhook secret".to_string()));
        }
    }

    tracing::info!(
        "Received payment webhook: {:?} for booking {}",
        payload.outcome,
        payload.booking_id
    );

    Ok(Json(state.finalizer.apply_payment_outcome(&payload).await?))
}
