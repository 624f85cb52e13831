pub mod availability;
pub mod breaker;
pub mod finalizer;
pub mod lock_manager;
pub mod transitions;

pub use availability::{AvailabilityReconciler, SeatCheck, SeatMap, SeatState, SeatStatus};
pub use breaker::{CircuitBreaker, CircuitState};
pub use finalizer::{BookingFinalizer, CreateBookingRequest};
pub use lock_manager::{AcquireResult, LockEntry, SeatLock, SeatLockManager};
