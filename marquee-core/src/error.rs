use marquee_shared::{PaymentStatus, SeatCoordinate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repository::RepositoryError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    Booked,
    Locked,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatConflict {
    pub seat: SeatCoordinate,
    pub reason: ConflictReason,
}

impl SeatConflict {
    pub fn booked(seat: SeatCoordinate) -> Self {
        Self { seat, reason: ConflictReason::Booked }
    }

    pub fn locked(seat: SeatCoordinate) -> Self {
        Self { seat, reason: ConflictReason::Locked }
    }
}

/// How the caller is expected to recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Seat taken by someone else; re-render the seat map.
    Contention,
    /// A booking rule said no; explain the rule.
    BusinessRule,
    Validation,
    NotFound,
    Forbidden,
    /// Stored state is inconsistent. Abort, report, never retry.
    Integrity,
    /// Backend trouble; a plain retry may work.
    Infrastructure,
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Seats unavailable: {}", describe(.0))]
    SeatUnavailable(Vec<SeatConflict>),

    #[error("Showtime {0} has already started")]
    ShowtimeInPast(Uuid),

    #[error("Insufficient seats: requested {requested}, available {available}")]
    InsufficientInventory {
        requested: i32,
        available: i32,
    },

    #[error("Too late to cancel: showtime starts in {minutes_until_start} minutes and cancellations close {cutoff_hours} hours before")]
    TooLateToCancel {
        minutes_until_start: i64,
        cutoff_hours: i64,
    },

    #[error("Invalid booking transition from {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Invalid seat selection: {0}")]
    InvalidSeats(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not permitted: {0}")]
    Forbidden(String),

    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Showtime not found: {0}")]
    ShowtimeNotFound(Uuid),

    #[error("Data integrity violation: {0}")]
    Integrity(String),

    #[error("Storage unavailable: {0}")]
    Storage(String),
}

fn describe(conflicts: &[SeatConflict]) -> String {
    conflicts
        .iter()
        .map(|c| match c.reason {
            ConflictReason::Booked => format!("{} (booked)", c.seat),
            ConflictReason::Locked => format!("{} (held)", c.seat),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl BookingError {
    /// Stable machine-readable reason.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::SeatUnavailable(_) => "seat_unavailable",
            BookingError::ShowtimeInPast(_) => "showtime_in_past",
            BookingError::InsufficientInventory { .. } => "insufficient_inventory",
            BookingError::TooLateToCancel { .. } => "too_late_to_cancel",
            BookingError::InvalidTransition { .. } => "invalid_transition",
            BookingError::InvalidSeats(_) => "invalid_seats",
            BookingError::InvalidRequest(_) => "invalid_request",
            BookingError::Forbidden(_) => "forbidden",
            BookingError::BookingNotFound(_) => "booking_not_found",
            BookingError::ShowtimeNotFound(_) => "showtime_not_found",
            BookingError::Integrity(_) => "integrity_violation",
            BookingError::Storage(_) => "storage_unavailable",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            BookingError::SeatUnavailable(_) => ErrorClass::Contention,
            BookingError::ShowtimeInPast(_)
            | BookingError::InsufficientInventory { .. }
            | BookingError::TooLateToCancel { .. }
            | BookingError::InvalidTransition { .. } => ErrorClass::BusinessRule,
            BookingError::InvalidSeats(_) | BookingError::InvalidRequest(_) => ErrorClass::Validation,
            BookingError::Forbidden(_) => ErrorClass::Forbidden,
            BookingError::BookingNotFound(_) | BookingError::ShowtimeNotFound(_) => ErrorClass::NotFound,
            BookingError::Integrity(_) => ErrorClass::Integrity,
            BookingError::Storage(_) => ErrorClass::Infrastructure,
        }
    }

    pub fn conflicts(&self) -> &[SeatConflict] {
        match self {
            BookingError::SeatUnavailable(conflicts) => conflicts,
            _ => &[],
        }
    }
}

impl From<RepositoryError> for BookingError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::SeatConflict(seats) => {
                BookingError::SeatUnavailable(seats.into_iter().map(SeatConflict::booked).collect())
            }
            RepositoryError::InsufficientInventory { requested, available } => {
                BookingError::InsufficientInventory { requested, available }
            }
            RepositoryError::ShowtimeNotFound(id) => BookingError::ShowtimeNotFound(id),
            RepositoryError::BookingNotFound(id) => BookingError::BookingNotFound(id),
            RepositoryError::StaleStatus { actual, to, .. } => BookingError::InvalidTransition { from: actual, to },
            RepositoryError::Integrity { showtime_id, detail } => {
                BookingError::Integrity(format!("showtime {}: {}", showtime_id, detail))
            }
            RepositoryError::Backend(msg) => BookingError::Storage(msg),
        }
    }
}
