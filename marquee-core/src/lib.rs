pub mod capability;
pub mod clock;
pub mod error;
pub mod lock_store;
pub mod notify;
pub mod payment;
pub mod refund;
pub mod repository;

pub use capability::{can_perform, Action, Actor, Ownership, Role};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{BookingError, ConflictReason, ErrorClass, SeatConflict};
pub use lock_store::{LockStore, LockStoreError};
pub use notify::{BookingBroadcaster, NotificationDispatcher, TracingNotifier};
pub use payment::{PaymentOutcome, PaymentResult};
pub use repository::{BookingRepository, RepositoryError, StatusChange};

/// Fixed lifetime of a seat hold. Holders must call `extend` before it elapses.
pub const SEAT_LOCK_TTL_SECONDS: u64 = 600;

/// Cancellations close this many hours before the showtime starts.
pub const CANCELLATION_CUTOFF_HOURS: i64 = 2;

pub type CoreResult<T> = Result<T, BookingError>;
