use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the payment gateway reports about a booking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentResult {
    Succeeded,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub booking_id: Uuid,
    pub outcome: PaymentResult,
    /// Gateway-side identifier, kept for the logs.
    pub reference: Option<String>,
}
