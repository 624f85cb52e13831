use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_shared::{Booking, PaymentStatus, SeatCoordinate, Showtime};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Seats already booked: {0:?}")]
    SeatConflict(Vec<SeatCoordinate>),

    #[error("Insufficient seats: requested {requested}, available {available}")]
    InsufficientInventory {
        requested: i32,
        available: i32,
    },

    #[error("Showtime not found: {0}")]
    ShowtimeNotFound(Uuid),

    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Booking {id} is {actual}, cannot move to {to}")]
    StaleStatus {
        id: Uuid,
        actual: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Capacity integrity violated for showtime {showtime_id}: {detail}")]
    Integrity {
        showtime_id: Uuid,
        detail: String,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// A requested status change, applied only while the booking is still in one of `from`.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub from: Vec<PaymentStatus>,
    pub to: PaymentStatus,
    pub at: DateTime<Utc>,
    pub refund_amount: Option<i64>,
}

impl StatusChange {
    pub fn new(from: &[PaymentStatus], to: PaymentStatus, at: DateTime<Utc>) -> Self {
        Self {
            from: from.to_vec(),
            to,
            at,
            refund_amount: None,
        }
    }

    pub fn with_refund(mut self, amount: i64) -> Self {
        self.refund_amount = Some(amount);
        self
    }
}

/// Persisted bookings and showtime counters.
///
/// Implementations own the capacity invariant: whenever a booking stops
/// consuming capacity (pending/paid to anything else) its seats go back to
/// `available_seats` in the same transaction as the status write. The counter
/// may never drop below zero or rise above the screen capacity.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn get_showtime(&self, id: Uuid) -> Result<Option<Showtime>, RepositoryError>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, RepositoryError>;

    /// Seats claimed by pending or paid bookings of the showtime.
    async fn active_seats(&self, showtime_id: Uuid) -> Result<Vec<SeatCoordinate>, RepositoryError>;

    /// Insert the booking and take its seats off the showtime counter atomically.
    /// Rejects with `SeatConflict` if any seat is already claimed, re-checked inside the transaction.
    async fn insert_booking(&self, booking: &Booking) -> Result<(), RepositoryError>;

    /// Apply `change` and return the updated booking.
    async fn transition(&self, booking_id: Uuid, change: &StatusChange) -> Result<Booking, RepositoryError>;

    /// Pending bookings created before `older_than`.
    async fn stale_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<Booking>, RepositoryError>;
}
