use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use marquee_core::refund::refund_amount;
use marquee_core::{
    Action, Actor, BookingBroadcaster, BookingError, BookingRepository, Clock, CoreResult, ErrorClass,
    NotificationDispatcher, PaymentOutcome, PaymentResult, StatusChange, CANCELLATION_CUTOFF_HOURS,
};
use marquee_shared::{
    BookedSeat, Booking, BroadcastEvent, BroadcastType, Masked, NotificationEvent, NotificationKind, PaymentStatus,
    SeatCoordinate,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::availability::AvailabilityReconciler;
use crate::lock_manager::SeatLockManager;
use crate::transitions::can_transition;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub showtime_id: Uuid,
    pub seats: Vec<BookedSeat>,
    pub user_id: String,
    pub payment_method: String,
    /// `pending` when omitted. Only `pending` and `paid` are accepted.
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
}

/// Owns booking records and the showtime seat counter. Every status change
/// goes through here so it is paired with lock release and exactly one
/// notification and one broadcast.
pub struct BookingFinalizer {
    bookings: Arc<dyn BookingRepository>,
    locks: Arc<SeatLockManager>,
    availability: Arc<AvailabilityReconciler>,
    notifier: Arc<dyn NotificationDispatcher>,
    broadcaster: Arc<dyn BookingBroadcaster>,
    clock: Arc<dyn Clock>,
    cancellation_cutoff_hours: i64,
}

impl BookingFinalizer {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        locks: Arc<SeatLockManager>,
        notifier: Arc<dyn NotificationDispatcher>,
        broadcaster: Arc<dyn BookingBroadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let availability = Arc::new(AvailabilityReconciler::new(locks.clone(), bookings.clone()));
        Self {
            bookings,
            locks,
            availability,
            notifier,
            broadcaster,
            clock,
            cancellation_cutoff_hours: CANCELLATION_CUTOFF_HOURS,
        }
    }

    pub fn with_cancellation_cutoff(mut self, hours: i64) -> Self {
        self.cancellation_cutoff_hours = hours;
        self
    }

    pub fn availability(&self) -> Arc<AvailabilityReconciler> {
        self.availability.clone()
    }

    pub fn locks(&self) -> Arc<SeatLockManager> {
        self.locks.clone()
    }

    pub async fn create_booking(&self, request: CreateBookingRequest) -> CoreResult<Booking> {
        let status = request.payment_status.unwrap_or(PaymentStatus::Pending);
        if !status.consumes_capacity() {
            return Err(BookingError::InvalidRequest(format!(
                "bookings start as pending or paid, not {}",
                status
            )));
        }
        let coordinates = validate_seats(&request.seats)?;

        let showtime = self
            .bookings
            .get_showtime(request.showtime_id)
            .await?
            .ok_or(BookingError::ShowtimeNotFound(request.showtime_id))?;

        let now = self.clock.now();
        if showtime.start_time <= now {
            return Err(BookingError::ShowtimeInPast(showtime.id));
        }

        let outside: Vec<String> = coordinates
            .iter()
            .filter(|seat| !showtime.layout.contains(seat))
            .map(|seat| seat.to_string())
            .collect();
        if !outside.is_empty() {
            return Err(BookingError::InvalidSeats(format!(
                "not in the screen layout: {}",
                outside.join(", ")
            )));
        }

        let requested = coordinates.len() as i32;
        if showtime.available_seats < requested {
            return Err(BookingError::InsufficientInventory {
                requested,
                available: showtime.available_seats,
            });
        }

        // Holds by other users and existing bookings both block the request.
        // Bookings are checked again inside the insert transaction.
        let check = self
            .availability
            .check_requested_seats_for(showtime.id, &coordinates, &request.user_id)
            .await?;
        if !check.available {
            warn!(
                showtime_id = %showtime.id,
                user = %Masked(request.user_id.as_str()),
                conflicts = check.unavailable_seats.len(),
                "Booking rejected, seats unavailable"
            );
            return Err(BookingError::SeatUnavailable(check.unavailable_seats));
        }

        let booking = Booking::new(
            request.user_id,
            showtime.id,
            request.seats,
            request.payment_method,
            status,
            now,
        );
        self.bookings.insert_booking(&booking).await.map_err(|e| log_failure(booking.id, e.into()))?;

        if status == PaymentStatus::Paid {
            self.locks.release(booking.showtime_id, &coordinates, Some(&booking.user_id)).await;
        }

        info!(
            booking_id = %booking.id,
            showtime_id = %booking.showtime_id,
            user = %Masked(booking.user_id.as_str()),
            seats = booking.seats.len(),
            status = %booking.payment_status,
            "Booking created"
        );
        self.emit(NotificationKind::BookingConfirmation, BroadcastType::NewBooking, &booking);
        Ok(booking)
    }

    /// Booking lookup for `actor`, who must own it or be staff.
    pub async fn get_booking(&self, booking_id: Uuid, actor: &Actor) -> CoreResult<Booking> {
        let booking = self.load(booking_id).await?;
        if !actor.can(Action::ViewBooking, &booking.user_id) {
            return Err(BookingError::Forbidden("booking belongs to another user".to_string()));
        }
        Ok(booking)
    }

    /// `pending -> paid`. The seats are now durably owned, so the holds go.
    pub async fn confirm_payment(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let change = StatusChange::new(&[PaymentStatus::Pending], PaymentStatus::Paid, self.clock.now());
        let booking = self.apply(booking_id, &change).await?;
        self.locks.release(booking.showtime_id, &booking.coordinates(), Some(&booking.user_id)).await;
        self.emit(NotificationKind::PaymentConfirmation, BroadcastType::BookingPaid, &booking);
        Ok(booking)
    }

    /// `pending | paid -> failed`. Seats return to the showtime.
    pub async fn fail_payment(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let change = StatusChange::new(
            &[PaymentStatus::Pending, PaymentStatus::Paid],
            PaymentStatus::Failed,
            self.clock.now(),
        );
        let booking = self.apply(booking_id, &change).await?;
        self.locks.release(booking.showtime_id, &booking.coordinates(), Some(&booking.user_id)).await;
        self.emit(NotificationKind::PaymentFailed, BroadcastType::BookingFailed, &booking);
        Ok(booking)
    }

    /// Cancel on behalf of `actor`, closing `cancellation_cutoff_hours` before
    /// the show. Paid bookings record the tiered refund; others record zero.
    pub async fn cancel_booking(&self, booking_id: Uuid, actor: &Actor) -> CoreResult<Booking> {
        let booking = self.load(booking_id).await?;
        if !actor.can(Action::CancelBooking, &booking.user_id) {
            return Err(BookingError::Forbidden("booking belongs to another user".to_string()));
        }

        let from = booking.payment_status;
        if !can_transition(from, PaymentStatus::Cancelled) {
            return Err(BookingError::InvalidTransition {
                from,
                to: PaymentStatus::Cancelled,
            });
        }

        let showtime = self.bookings.get_showtime(booking.showtime_id).await?.ok_or_else(|| {
            let err = BookingError::Integrity(format!(
                "booking {} references missing showtime {}",
                booking.id, booking.showtime_id
            ));
            error!(error = %err, "Cancellation aborted");
            err
        })?;

        let now = self.clock.now();
        let until_start = showtime.start_time - now;
        if until_start < Duration::hours(self.cancellation_cutoff_hours) {
            return Err(BookingError::TooLateToCancel {
                minutes_until_start: until_start.num_minutes(),
                cutoff_hours: self.cancellation_cutoff_hours,
            });
        }

        let refund = if from == PaymentStatus::Paid {
            refund_amount(booking.total_amount, until_start)
        } else {
            0
        };
        // Pinned to the status read above so a concurrent payment update loses cleanly.
        let change = StatusChange::new(&[from], PaymentStatus::Cancelled, now).with_refund(refund);
        let cancelled = self.apply(booking_id, &change).await?;

        self.locks.release(cancelled.showtime_id, &cancelled.coordinates(), Some(&cancelled.user_id)).await;
        info!(booking_id = %cancelled.id, refund, "Booking cancelled");
        self.emit(NotificationKind::Cancellation, BroadcastType::BookingCancelled, &cancelled);
        Ok(cancelled)
    }

    /// Gateway refund. From `paid` the full amount is refunded and seats return;
    /// from `cancelled` the refund recorded at cancellation stands.
    pub async fn refund(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let booking = self.load(booking_id).await?;
        let from = booking.payment_status;
        if !can_transition(from, PaymentStatus::Refunded) {
            return Err(BookingError::InvalidTransition {
                from,
                to: PaymentStatus::Refunded,
            });
        }

        let mut change = StatusChange::new(&[from], PaymentStatus::Refunded, self.clock.now());
        if from == PaymentStatus::Paid {
            change = change.with_refund(booking.total_amount);
        }
        let refunded = self.apply(booking_id, &change).await?;
        self.emit(NotificationKind::Refund, BroadcastType::BookingRefunded, &refunded);
        Ok(refunded)
    }

    pub async fn apply_payment_outcome(&self, outcome: &PaymentOutcome) -> CoreResult<Booking> {
        debug!(
            booking_id = %outcome.booking_id,
            outcome = ?outcome.outcome,
            reference = outcome.reference.as_deref().unwrap_or("-"),
            "Payment outcome received"
        );
        match outcome.outcome {
            PaymentResult::Succeeded => self.confirm_payment(outcome.booking_id).await,
            PaymentResult::Failed => self.fail_payment(outcome.booking_id).await,
            PaymentResult::Refunded => self.refund(outcome.booking_id).await,
        }
    }

    /// Fail pending bookings older than `timeout` so their seats return.
    /// Returns how many were failed.
    pub async fn expire_stale_pending(&self, timeout: Duration) -> CoreResult<usize> {
        let now = self.clock.now();
        let stale = self.bookings.stale_pending(now - timeout).await?;

        let mut expired = 0;
        for booking in stale {
            let change = StatusChange::new(&[PaymentStatus::Pending], PaymentStatus::Failed, now);
            match self.apply(booking.id, &change).await {
                Ok(failed) => {
                    self.locks.release(failed.showtime_id, &failed.coordinates(), Some(&failed.user_id)).await;
                    self.emit(NotificationKind::PaymentFailed, BroadcastType::BookingFailed, &failed);
                    expired += 1;
                }
                Err(BookingError::InvalidTransition { from, .. }) => {
                    debug!(booking_id = %booking.id, status = %from, "Pending booking settled before expiry");
                }
                Err(err) if err.class() == ErrorClass::Integrity => return Err(err),
                Err(err) => warn!(booking_id = %booking.id, error = %err, "Failed to expire pending booking"),
            }
        }

        if expired > 0 {
            info!(expired, "Expired unpaid bookings");
        }
        Ok(expired)
    }

    async fn load(&self, booking_id: Uuid) -> CoreResult<Booking> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))
    }

    async fn apply(&self, booking_id: Uuid, change: &StatusChange) -> CoreResult<Booking> {
        let booking = self
            .bookings
            .transition(booking_id, change)
            .await
            .map_err(|e| log_failure(booking_id, e.into()))?;
        info!(booking_id = %booking.id, status = %booking.payment_status, "Booking status changed");
        Ok(booking)
    }

    fn emit(&self, kind: NotificationKind, event_type: BroadcastType, booking: &Booking) {
        self.notifier.dispatch(NotificationEvent {
            kind,
            booking: booking.clone(),
            user_id: booking.user_id.clone(),
            timestamp: self.clock.now().timestamp(),
        });
        self.broadcaster.broadcast(BroadcastEvent::new(event_type, booking));
    }
}

fn log_failure(booking_id: Uuid, err: BookingError) -> BookingError {
    if err.class() == ErrorClass::Integrity {
        error!(%booking_id, error = %err, "Booking write aborted on integrity violation");
    }
    err
}

fn validate_seats(seats: &[BookedSeat]) -> CoreResult<Vec<SeatCoordinate>> {
    if seats.is_empty() {
        return Err(BookingError::InvalidSeats("at least one seat is required".to_string()));
    }
    if let Some(seat) = seats.iter().find(|s| s.price < 0) {
        return Err(BookingError::InvalidRequest(format!(
            "negative price for seat {}",
            seat.coordinate()
        )));
    }
    if seats.iter().try_fold(0i64, |total, s| total.checked_add(s.price)).is_none() {
        return Err(BookingError::InvalidRequest("booking total is out of range".to_string()));
    }

    let mut seen = HashSet::new();
    let mut coordinates = Vec::with_capacity(seats.len());
    for seat in seats {
        let coordinate = seat.coordinate();
        if !seen.insert(coordinate.clone()) {
            return Err(BookingError::InvalidSeats(format!("seat {} requested twice", coordinate)));
        }
        coordinates.push(coordinate);
    }
    Ok(coordinates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use marquee_core::{FixedClock, Role};
    use marquee_shared::{ScreenLayout, Showtime};
    use marquee_store::memory::{InMemoryBookingRepository, InMemoryLockStore};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        notifications: Mutex<Vec<NotificationKind>>,
        broadcasts: Mutex<Vec<BroadcastType>>,
    }

    impl NotificationDispatcher for Recorder {
        fn dispatch(&self, event: NotificationEvent) {
            self.notifications.lock().unwrap().push(event.kind);
        }
    }

    impl BookingBroadcaster for Recorder {
        fn broadcast(&self, event: BroadcastEvent) {
            self.broadcasts.lock().unwrap().push(event.event_type);
        }
    }

    struct Fixture {
        finalizer: BookingFinalizer,
        repo: Arc<InMemoryBookingRepository>,
        clock: Arc<FixedClock>,
        events: Arc<Recorder>,
        showtime_id: Uuid,
    }

    async fn fixture(hours_until_show: i64) -> Fixture {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let store = Arc::new(InMemoryLockStore::with_clock(clock.clone()));
        let locks = Arc::new(SeatLockManager::new(store, clock.clone()));
        let repo = Arc::new(InMemoryBookingRepository::new());
        let events = Arc::new(Recorder::default());

        let showtime = Showtime::new(
            "Nosferatu".to_string(),
            "Screen 2".to_string(),
            clock.now() + Duration::hours(hours_until_show),
            ScreenLayout::uniform(2, 5),
        );
        let showtime_id = showtime.id;
        repo.add_showtime(showtime).await;

        let finalizer = BookingFinalizer::new(repo.clone(), locks, events.clone(), events.clone(), clock.clone());
        Fixture {
            finalizer,
            repo,
            clock,
            events,
            showtime_id,
        }
    }

    fn request(showtime_id: Uuid, user: &str, seats: &[(&str, u32)], status: Option<PaymentStatus>) -> CreateBookingRequest {
        CreateBookingRequest {
            showtime_id,
            seats: seats
                .iter()
                .map(|(row, n)| BookedSeat::new(SeatCoordinate::new(*row, *n), 1_000))
                .collect(),
            user_id: user.to_string(),
            payment_method: "card".to_string(),
            payment_status: status,
        }
    }

    async fn available(f: &Fixture) -> i32 {
        f.repo.showtime(f.showtime_id).await.unwrap().available_seats
    }

    #[tokio::test]
    async fn test_create_reserves_capacity_and_emits_once() {
        let f = fixture(30).await;
        let booking = f
            .finalizer
            .create_booking(request(f.showtime_id, "alice", &[("A", 1), ("A", 2)], None))
            .await
            .unwrap();

        assert_eq!(booking.payment_status, PaymentStatus::Pending);
        assert_eq!(booking.total_amount, 2_000);
        assert_eq!(available(&f).await, 8);
        assert_eq!(*f.events.notifications.lock().unwrap(), vec![NotificationKind::BookingConfirmation]);
        assert_eq!(*f.events.broadcasts.lock().unwrap(), vec![BroadcastType::NewBooking]);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let f = fixture(30).await;

        let err = f.finalizer.create_booking(request(f.showtime_id, "alice", &[], None)).await.unwrap_err();
        assert_eq!(err.code(), "invalid_seats");

        let err = f
            .finalizer
            .create_booking(request(f.showtime_id, "alice", &[("A", 1), ("A", 1)], None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_seats");

        let err = f
            .finalizer
            .create_booking(request(f.showtime_id, "alice", &[("Z", 1)], None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_seats");

        let err = f
            .finalizer
            .create_booking(request(f.showtime_id, "alice", &[("A", 1)], Some(PaymentStatus::Refunded)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_request");

        let err = f
            .finalizer
            .create_booking(request(Uuid::new_v4(), "alice", &[("A", 1)], None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "showtime_not_found");

        assert_eq!(available(&f).await, 10);
        assert!(f.events.notifications.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_showtime_in_past() {
        let f = fixture(1).await;
        f.clock.advance(Duration::hours(2));
        let err = f
            .finalizer
            .create_booking(request(f.showtime_id, "alice", &[("A", 1)], None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "showtime_in_past");
        assert_eq!(err.class(), ErrorClass::BusinessRule);
    }

    #[tokio::test]
    async fn test_double_booking_rejected() {
        let f = fixture(30).await;
        f.finalizer
            .create_booking(request(f.showtime_id, "alice", &[("B", 3)], Some(PaymentStatus::Paid)))
            .await
            .unwrap();

        let err = f
            .finalizer
            .create_booking(request(f.showtime_id, "bob", &[("B", 2), ("B", 3)], None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "seat_unavailable");
        assert_eq!(err.conflicts().len(), 1);
        assert_eq!(err.conflicts()[0].seat, SeatCoordinate::new("B", 3));
        assert_eq!(available(&f).await, 9);
    }

    #[tokio::test]
    async fn test_someone_elses_hold_blocks_booking() {
        let f = fixture(30).await;
        f.finalizer
            .locks()
            .acquire(f.showtime_id, &[SeatCoordinate::new("A", 4)], "bob")
            .await
            .unwrap();

        let err = f
            .finalizer
            .create_booking(request(f.showtime_id, "alice", &[("A", 4)], None))
            .await
            .unwrap_err();
        assert_eq!(err.conflicts()[0].reason, marquee_core::ConflictReason::Locked);

        // bob's own hold does not block bob
        f.finalizer
            .create_booking(request(f.showtime_id, "bob", &[("A", 4)], None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_payment_lifecycle() {
        let f = fixture(30).await;
        let booking = f
            .finalizer
            .create_booking(request(f.showtime_id, "alice", &[("A", 1)], None))
            .await
            .unwrap();

        let paid = f.finalizer.confirm_payment(booking.id).await.unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(available(&f).await, 9);

        let err = f.finalizer.confirm_payment(booking.id).await.unwrap_err();
        assert_eq!(err.code(), "invalid_transition");

        let failed = f.finalizer.fail_payment(booking.id).await.unwrap();
        assert_eq!(failed.payment_status, PaymentStatus::Failed);
        assert_eq!(available(&f).await, 10);

        assert_eq!(
            *f.events.broadcasts.lock().unwrap(),
            vec![BroadcastType::NewBooking, BroadcastType::BookingPaid, BroadcastType::BookingFailed]
        );
    }

    #[tokio::test]
    async fn test_cancel_records_tiered_refund() {
        let f = fixture(5).await;
        let booking = f
            .finalizer
            .create_booking(request(f.showtime_id, "alice", &[("A", 1), ("A", 2)], Some(PaymentStatus::Paid)))
            .await
            .unwrap();

        let owner = Actor::new("alice", Role::Customer);
        let cancelled = f.finalizer.cancel_booking(booking.id, &owner).await.unwrap();
        assert_eq!(cancelled.payment_status, PaymentStatus::Cancelled);
        assert_eq!(cancelled.refund_amount, Some(1_000));
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(available(&f).await, 10);

        // the gateway settles the refund later; capacity is already back
        let refunded = f.finalizer.refund(booking.id).await.unwrap();
        assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
        assert_eq!(refunded.refund_amount, Some(1_000));
        assert_eq!(available(&f).await, 10);
    }

    #[tokio::test]
    async fn test_cancel_unpaid_refunds_nothing() {
        let f = fixture(30).await;
        let booking = f
            .finalizer
            .create_booking(request(f.showtime_id, "alice", &[("A", 1)], None))
            .await
            .unwrap();

        let cancelled = f
            .finalizer
            .cancel_booking(booking.id, &Actor::new("alice", Role::Customer))
            .await
            .unwrap();
        assert_eq!(cancelled.refund_amount, Some(0));
    }

    #[tokio::test]
    async fn test_cancel_too_late_leaves_booking_untouched() {
        let f = fixture(1).await;
        let booking = f
            .finalizer
            .create_booking(request(f.showtime_id, "alice", &[("A", 1)], Some(PaymentStatus::Paid)))
            .await
            .unwrap();

        let err = f
            .finalizer
            .cancel_booking(booking.id, &Actor::new("alice", Role::Customer))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::TooLateToCancel { cutoff_hours: 2, .. }));

        let stored = f.repo.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert_eq!(available(&f).await, 9);
        assert_eq!(f.events.notifications.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_requires_capability() {
        let f = fixture(30).await;
        let booking = f
            .finalizer
            .create_booking(request(f.showtime_id, "alice", &[("A", 1)], None))
            .await
            .unwrap();

        let err = f
            .finalizer
            .cancel_booking(booking.id, &Actor::new("mallory", Role::Customer))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");

        f.finalizer
            .cancel_booking(booking.id, &Actor::new("front-desk", Role::TheaterManager))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_payment_outcomes_drive_state_machine() {
        let f = fixture(30).await;
        let booking = f
            .finalizer
            .create_booking(request(f.showtime_id, "alice", &[("B", 1), ("B", 2)], None))
            .await
            .unwrap();

        let outcome = |outcome| PaymentOutcome {
            booking_id: booking.id,
            outcome,
            reference: Some("pi_123".to_string()),
        };

        f.finalizer.apply_payment_outcome(&outcome(PaymentResult::Succeeded)).await.unwrap();
        let refunded = f.finalizer.apply_payment_outcome(&outcome(PaymentResult::Refunded)).await.unwrap();
        assert_eq!(refunded.refund_amount, Some(2_000));
        assert_eq!(available(&f).await, 10);

        let err = f.finalizer.apply_payment_outcome(&outcome(PaymentResult::Failed)).await.unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
    }

    #[tokio::test]
    async fn test_expire_stale_pending() {
        let f = fixture(30).await;
        let stale = f
            .finalizer
            .create_booking(request(f.showtime_id, "alice", &[("A", 1)], None))
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(20));
        let fresh = f
            .finalizer
            .create_booking(request(f.showtime_id, "bob", &[("A", 2)], None))
            .await
            .unwrap();

        let expired = f.finalizer.expire_stale_pending(Duration::minutes(15)).await.unwrap();
        assert_eq!(expired, 1);
        assert_eq!(
            f.repo.get_booking(stale.id).await.unwrap().unwrap().payment_status,
            PaymentStatus::Failed
        );
        assert_eq!(
            f.repo.get_booking(fresh.id).await.unwrap().unwrap().payment_status,
            PaymentStatus::Pending
        );
        assert_eq!(available(&f).await, 9);
    }

    #[tokio::test]
    async fn test_view_booking_capability() {
        let f = fixture(30).await;
        let booking = f
            .finalizer
            .create_booking(request(f.showtime_id, "alice", &[("A", 5)], None))
            .await
            .unwrap();

        assert!(f.finalizer.get_booking(booking.id, &Actor::new("alice", Role::Customer)).await.is_ok());
        assert!(f.finalizer.get_booking(booking.id, &Actor::new("root", Role::Admin)).await.is_ok());
        let err = f
            .finalizer
            .get_booking(booking.id, &Actor::new("bob", Role::Customer))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Forbidden);
    }

    #[tokio::test]
    async fn test_price_total_overflow_rejected() {
        let f = fixture(30).await;
        let mut req = request(f.showtime_id, "alice", &[("A", 1), ("A", 2)], None);
        for seat in &mut req.seats {
            seat.price = i64::MAX;
        }

        let err = f.finalizer.create_booking(req).await.unwrap_err();
        assert_eq!(err.code(), "invalid_request");
        assert_eq!(available(&f).await, 10);
        assert!(f.events.notifications.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_refund_on_huge_total() {
        let f = fixture(30).await;
        let mut req = request(f.showtime_id, "alice", &[("B", 1)], Some(PaymentStatus::Paid));
        req.seats[0].price = i64::MAX / 50;
        let booking = f.finalizer.create_booking(req).await.unwrap();

        let cancelled = f
            .finalizer
            .cancel_booking(booking.id, &Actor::new("alice", Role::Customer))
            .await
            .unwrap();
        assert_eq!(cancelled.refund_amount, Some(i64::MAX / 50));
    }
}
