use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use marquee_booking::CreateBookingRequest;
use marquee_core::{Action, Actor};
use marquee_shared::{BookedSeat, Booking, PaymentStatus};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NewBookingRequest {
    pub showtime_id: Uuid,
    pub seats: Vec<BookedSeat>,
    pub payment_method: String,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
}

/// POST /v1/bookings
async fn create_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<NewBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    if !actor.can(Action::CreateBooking, &actor.user_id) {
        return Err(AppError::Forbidden("not allowed to book".to_string()));
    }

    let booking = state
        .finalizer
        .create_booking(CreateBookingRequest {
            showtime_id: req.showtime_id,
            seats: req.seats,
            user_id: actor.user_id,
            payment_method: req.payment_method,
            payment_status: req.payment_status,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /v1/bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.finalizer.get_booking(booking_id, &actor).await?))
}

/// POST /v1/bookings/{id}/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.finalizer.cancel_booking(booking_id, &actor).await?))
}
