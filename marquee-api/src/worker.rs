use std::sync::Arc;
use std::time::Duration;

use marquee_booking::BookingFinalizer;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Periodic cleanup: fails bookings whose payment never arrived and reclaims
/// expired seat locks on stores without native expiry. Never required for
/// correctness of holds; the lock TTL is.
pub async fn start_sweep_worker(finalizer: Arc<BookingFinalizer>, every: Duration, pending_timeout: Duration) {
    let pending_timeout = match chrono::Duration::from_std(pending_timeout) {
        Ok(timeout) => timeout,
        Err(e) => {
            error!("Invalid pending payment timeout, sweep disabled: {}", e);
            return;
        }
    };

    let every = every.max(MIN_SWEEP_INTERVAL);
    info!("Sweep worker started, running every {:?}", every);
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        run_sweep(&finalizer, pending_timeout).await;
    }
}

pub async fn run_sweep(finalizer: &BookingFinalizer, pending_timeout: chrono::Duration) {
    match finalizer.expire_stale_pending(pending_timeout).await {
        Ok(0) => {}
        Ok(expired) => info!("Sweep failed {} unpaid bookings", expired),
        Err(e) => error!("Sweep of unpaid bookings failed: {}", e),
    }

    let purged = finalizer.locks().sweep().await;
    if purged > 0 {
        debug!("Sweep purged {} expired seat locks", purged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChannelBroadcaster;
    use chrono::Utc;
    use marquee_booking::{CreateBookingRequest, SeatLockManager};
    use marquee_core::{Actor, FixedClock, Role, TracingNotifier};
    use marquee_shared::{BookedSeat, PaymentStatus, ScreenLayout, SeatCoordinate, Showtime};
    use marquee_store::{InMemoryBookingRepository, InMemoryLockStore};
    use uuid::Uuid;

    struct Fixture {
        finalizer: Arc<BookingFinalizer>,
        locks: Arc<SeatLockManager>,
        repo: Arc<InMemoryBookingRepository>,
        clock: Arc<FixedClock>,
        showtime_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let repo = Arc::new(InMemoryBookingRepository::new());
        let showtime = Showtime::new(
            "Playtime".to_string(),
            "Screen 3".to_string(),
            Utc::now() + chrono::Duration::days(2),
            ScreenLayout::uniform(1, 6),
        );
        let showtime_id = showtime.id;
        repo.add_showtime(showtime).await;

        let store = Arc::new(InMemoryLockStore::with_clock(clock.clone()));
        let locks = Arc::new(SeatLockManager::new(store, clock.clone()));
        let (tx, _) = tokio::sync::broadcast::channel(4);
        let finalizer = Arc::new(BookingFinalizer::new(
            repo.clone(),
            locks.clone(),
            Arc::new(TracingNotifier),
            Arc::new(ChannelBroadcaster::new(tx)),
            clock.clone(),
        ));

        Fixture {
            finalizer,
            locks,
            repo,
            clock,
            showtime_id,
        }
    }

    #[tokio::test]
    async fn test_sweep_fails_unpaid_bookings_and_returns_seats() {
        let f = fixture().await;

        let seats = vec![SeatCoordinate::new("A", 2)];
        f.locks.acquire(f.showtime_id, &seats, "user-1").await.unwrap();
        let booking = f
            .finalizer
            .create_booking(CreateBookingRequest {
                showtime_id: f.showtime_id,
                seats: vec![BookedSeat::new(seats[0].clone(), 900)],
                user_id: "user-1".to_string(),
                payment_method: "card".to_string(),
                payment_status: None,
            })
            .await
            .unwrap();
        assert_eq!(f.repo.showtime(f.showtime_id).await.unwrap().available_seats, 5);

        f.clock.advance(chrono::Duration::minutes(20));
        run_sweep(&f.finalizer, chrono::Duration::minutes(15)).await;

        let swept = f
            .finalizer
            .get_booking(booking.id, &Actor::new("user-1", Role::Customer))
            .await
            .unwrap();
        assert_eq!(swept.payment_status, PaymentStatus::Failed);
        assert_eq!(f.repo.showtime(f.showtime_id).await.unwrap().available_seats, 6);
        assert!(f.locks.active_locks(f.showtime_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_interval_keeps_worker_alive() {
        let f = fixture().await;
        let handle = tokio::spawn(start_sweep_worker(
            f.finalizer.clone(),
            Duration::ZERO,
            Duration::from_secs(900),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
