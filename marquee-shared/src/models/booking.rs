use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use super::seat::SeatCoordinate;

/// Payment status of a booking. Cancellation is a status, never a delete.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Pending and paid bookings hold their seats against the showtime capacity.
    pub fn consumes_capacity(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Paid)
    }

    /// Change to a showtime's available seats when a booking of `seats` moves
    /// from `self` to `to`.
    pub fn available_seat_delta(&self, to: PaymentStatus, seats: i32) -> i32 {
        match (self.consumes_capacity(), to.consumes_capacity()) {
            (true, false) => seats,
            (false, true) => -seats,
            _ => 0,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// A seat inside a booking, priced in minor currency units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookedSeat {
    pub row: String,
    pub seat_number: u32,
    pub price: i64,
}

impl BookedSeat {
    pub fn new(seat: SeatCoordinate, price: i64) -> Self {
        Self {
            row: seat.row,
            seat_number: seat.seat_number,
            price,
        }
    }

    pub fn coordinate(&self) -> SeatCoordinate {
        SeatCoordinate::new(self.row.clone(), self.seat_number)
    }
}

/// The permanent record of a purchase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: String,
    pub showtime_id: Uuid,
    pub seats: Vec<BookedSeat>,
    pub total_amount: i64,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub booking_date: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refund_amount: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        user_id: String,
        showtime_id: Uuid,
        seats: Vec<BookedSeat>,
        payment_method: String,
        payment_status: PaymentStatus,
        booking_date: DateTime<Utc>,
    ) -> Self {
        let total_amount = seats.iter().fold(0i64, |total, s| total.saturating_add(s.price));
        Self {
            id: Uuid::new_v4(),
            user_id,
            showtime_id,
            seats,
            total_amount,
            payment_method,
            payment_status,
            booking_date,
            cancelled_at: None,
            refund_amount: None,
            updated_at: booking_date,
        }
    }

    pub fn seat_count(&self) -> i32 {
        self.seats.len() as i32
    }

    pub fn coordinates(&self) -> Vec<SeatCoordinate> {
        self.seats.iter().map(BookedSeat::coordinate).collect()
    }
}
