pub mod models;
pub mod pii;

pub use models::booking::{BookedSeat, Booking, PaymentStatus};
pub use models::events::{BroadcastEvent, BroadcastType, NotificationEvent, NotificationKind};
pub use models::seat::SeatCoordinate;
pub use models::showtime::{ScreenLayout, SeatRow, Showtime};
pub use pii::Masked;
