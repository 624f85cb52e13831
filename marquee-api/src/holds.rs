use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Extension, Json, Router,
};
use futures_util::{Stream, StreamExt};
use marquee_booking::{SeatCheck, SeatMap};
use marquee_core::{can_perform, Action, Actor, Ownership, SEAT_LOCK_TTL_SECONDS};
use marquee_shared::{Masked, SeatCoordinate};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SeatsRequest {
    pub seats: Vec<SeatCoordinate>,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub seats: Vec<SeatCoordinate>,
    /// Whose holds to release; the caller when omitted. Naming another user needs a staff role.
    #[serde(default)]
    pub holder: Option<String>,
    /// Remove the holds whoever owns them. Admins only.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub released: usize,
}

#[derive(Debug, Serialize)]
pub struct ExtendResponse {
    pub extended: Vec<SeatCoordinate>,
    pub expires_in_seconds: u64,
}

/// Hold routes; require an authenticated [`Actor`].
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/showtimes/{id}/holds", post(acquire_holds).delete(release_holds))
        .route("/v1/showtimes/{id}/holds/extend", post(extend_holds))
}

/// Seat map, pre-flight check and live stream; open to anonymous browsers.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/showtimes/{id}/seats", get(seat_map))
        .route("/v1/showtimes/{id}/seats/check", post(check_seats))
        .route("/v1/showtimes/{id}/stream", get(stream_showtime))
}

/// POST /v1/showtimes/{id}/holds
async fn acquire_holds(
    State(state): State<AppState>,
    Path(showtime_id): Path<Uuid>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<SeatsRequest>,
) -> Result<Response, AppError> {
    if !actor.can(Action::HoldSeats, &actor.user_id) {
        return Err(AppError::Forbidden("not allowed to hold seats".to_string()));
    }

    let result = state.locks.acquire(showtime_id, &req.seats, &actor.user_id).await?;
    if result.success {
        Ok((StatusCode::OK, Json(result)).into_response())
    } else {
        Ok((StatusCode::CONFLICT, Json(result)).into_response())
    }
}

/// DELETE /v1/showtimes/{id}/holds
async fn release_holds(
    State(state): State<AppState>,
    Path(showtime_id): Path<Uuid>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<ReleaseRequest>,
) -> Result<Json<ReleaseResponse>, AppError> {
    let released = if req.force {
        if !can_perform(actor.role, Ownership::NotOwner, Action::ForceReleaseHold) {
            return Err(AppError::Forbidden("force release requires the admin role".to_string()));
        }
        info!(%showtime_id, by = %Masked(actor.user_id.as_str()), seats = req.seats.len(), "Force releasing holds");
        state.locks.release(showtime_id, &req.seats, None).await
    } else {
        let holder = req.holder.as_deref().unwrap_or(&actor.user_id);
        if !actor.can(Action::ReleaseHold, holder) {
            return Err(AppError::Forbidden("not allowed to release another user's holds".to_string()));
        }
        if holder != actor.user_id {
            info!(
                %showtime_id,
                by = %Masked(actor.user_id.as_str()),
                holder = %Masked(holder),
                seats = req.seats.len(),
                "Releasing holds on behalf of holder"
            );
        }
        state.locks.release(showtime_id, &req.seats, Some(holder)).await
    };

    Ok(Json(ReleaseResponse { released }))
}

/// POST /v1/showtimes/{id}/holds/extend
async fn extend_holds(
    State(state): State<AppState>,
    Path(showtime_id): Path<Uuid>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<SeatsRequest>,
) -> Result<Json<ExtendResponse>, AppError> {
    if !actor.can(Action::ExtendHold, &actor.user_id) {
        return Err(AppError::Forbidden("not allowed to extend holds".to_string()));
    }
    let extended = state.locks.extend(showtime_id, &req.seats, &actor.user_id).await;
    Ok(Json(ExtendResponse {
        extended,
        expires_in_seconds: SEAT_LOCK_TTL_SECONDS,
    }))
}

/// GET /v1/showtimes/{id}/seats
async fn seat_map(State(state): State<AppState>, Path(showtime_id): Path<Uuid>) -> Result<Json<SeatMap>, AppError> {
    Ok(Json(state.availability.get_seat_map(showtime_id).await?))
}

/// POST /v1/showtimes/{id}/seats/check
async fn check_seats(
    State(state): State<AppState>,
    Path(showtime_id): Path<Uuid>,
    Json(req): Json<SeatsRequest>,
) -> Result<Json<SeatCheck>, AppError> {
    Ok(Json(state.availability.check_requested_seats(showtime_id, &req.seats).await?))
}

/// GET /v1/showtimes/{id}/stream
async fn stream_showtime(
    State(state): State<AppState>,
    Path(showtime_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sse_tx.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.showtime_id == showtime_id => Event::default()
                .event(event.event_type.as_str())
                .json_data(&event)
                .ok()
                .map(Ok),
            Ok(_) => None,
            Err(e) => {
                debug!(%showtime_id, "SSE subscriber lagging: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
