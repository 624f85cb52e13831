use uuid::Uuid;

use super::booking::Booking;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingConfirmation,
    PaymentConfirmation,
    PaymentFailed,
    Cancellation,
    Refund,
}

/// Handed to the notification dispatcher (email/SMS). Delivery is not awaited.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub booking: Booking,
    pub user_id: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BroadcastType {
    NewBooking,
    BookingPaid,
    BookingFailed,
    BookingCancelled,
    BookingRefunded,
}

impl BroadcastType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastType::NewBooking => "NEW_BOOKING",
            BroadcastType::BookingPaid => "BOOKING_PAID",
            BroadcastType::BookingFailed => "BOOKING_FAILED",
            BroadcastType::BookingCancelled => "BOOKING_CANCELLED",
            BroadcastType::BookingRefunded => "BOOKING_REFUNDED",
        }
    }
}

/// Fanned out to real-time subscribers watching a showtime.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BroadcastEvent {
    #[serde(rename = "type")]
    pub event_type: BroadcastType,
    pub showtime_id: Uuid,
    pub data: Booking,
}

impl BroadcastEvent {
    pub fn new(event_type: BroadcastType, booking: &Booking) -> Self {
        Self {
            event_type,
            showtime_id: booking.showtime_id,
            data: booking.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::PaymentStatus;
    use chrono::Utc;

    #[test]
    fn test_broadcast_wire_format() {
        let booking = Booking::new(
            "user-1".to_string(),
            Uuid::new_v4(),
            Vec::new(),
            "card".to_string(),
            PaymentStatus::Paid,
            Utc::now(),
        );
        let event = BroadcastEvent::new(BroadcastType::BookingCancelled, &booking);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], BroadcastType::BookingCancelled.as_str());
        assert_eq!(json["showtime_id"], booking.showtime_id.to_string());
        assert_eq!(json["data"]["payment_status"], "paid");
    }
}
