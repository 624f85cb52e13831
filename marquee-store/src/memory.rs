//! Process-local stores for tests and single-node deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_core::{
    BookingRepository, Clock, LockStore, LockStoreError, RepositoryError, StatusChange, SystemClock,
};
use marquee_shared::{Booking, PaymentStatus, SeatCoordinate, Showtime};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Expiring key-value map. Every operation runs under one mutex, which gives
/// the conditional writes the same atomicity Redis gives a single command.
pub struct InMemoryLockStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl Default for InMemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Time left on a live entry.
    pub async fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .and_then(|e| (e.expires_at - now).to_std().ok())
    }

    fn ensure_available(&self) -> Result<(), LockStoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LockStoreError::Unavailable("in-memory store switched off".to_string()))
        }
    }

    fn expiry(&self, ttl: Duration) -> Result<DateTime<Utc>, LockStoreError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| LockStoreError::Corrupt {
            key: String::new(),
            reason: e.to_string(),
        })?;
        Ok(self.clock.now() + ttl)
    }

    fn is_live(&self, entry: &Entry) -> bool {
        entry.expires_at > self.clock.now()
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LockStoreError> {
        self.ensure_available()?;
        let expires_at = self.expiry(ttl)?;
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|e| self.is_live(e)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockStoreError> {
        self.ensure_available()?;
        let entries = self.entries.lock().await;
        Ok(entries.get(key).filter(|e| self.is_live(e)).map(|e| e.value.clone()))
    }

    async fn refresh_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool, LockStoreError> {
        self.ensure_available()?;
        let expires_at = self.expiry(ttl)?;
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(entry) if self.is_live(entry) && entry.value == expected => {
                entry.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, LockStoreError> {
        self.ensure_available()?;
        let mut entries = self.entries.lock().await;
        let matches = entries.get(key).is_some_and(|e| self.is_live(e) && e.value == expected);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn delete(&self, key: &str) -> Result<bool, LockStoreError> {
        self.ensure_available()?;
        let mut entries = self.entries.lock().await;
        Ok(entries.remove(key).is_some_and(|e| self.is_live(&e)))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, LockStoreError> {
        self.ensure_available()?;
        let entries = self.entries.lock().await;
        let mut found: Vec<(String, String)> = entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && self.is_live(e))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect();
        found.sort();
        Ok(found)
    }

    async fn purge_expired(&self) -> Result<usize, LockStoreError> {
        self.ensure_available()?;
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        let now = self.clock.now();
        entries.retain(|_, e| e.expires_at > now);
        Ok(before - entries.len())
    }
}

#[derive(Default)]
struct BookingTables {
    showtimes: HashMap<Uuid, Showtime>,
    bookings: HashMap<Uuid, Booking>,
}

impl BookingTables {
    fn claimed_seats(&self, showtime_id: Uuid) -> HashSet<SeatCoordinate> {
        self.bookings
            .values()
            .filter(|b| b.showtime_id == showtime_id && b.payment_status.consumes_capacity())
            .flat_map(|b| b.coordinates())
            .collect()
    }
}

/// Bookings and showtimes behind one mutex, so a status write and its
/// counter adjustment are a single step.
#[derive(Default)]
pub struct InMemoryBookingRepository {
    tables: Mutex<BookingTables>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_showtime(&self, showtime: Showtime) {
        self.tables.lock().await.showtimes.insert(showtime.id, showtime);
    }

    pub async fn showtime(&self, id: Uuid) -> Option<Showtime> {
        self.tables.lock().await.showtimes.get(&id).cloned()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn get_showtime(&self, id: Uuid) -> Result<Option<Showtime>, RepositoryError> {
        Ok(self.showtime(id).await)
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, RepositoryError> {
        Ok(self.tables.lock().await.bookings.get(&id).cloned())
    }

    async fn active_seats(&self, showtime_id: Uuid) -> Result<Vec<SeatCoordinate>, RepositoryError> {
        let mut seats: Vec<SeatCoordinate> = self.tables.lock().await.claimed_seats(showtime_id).into_iter().collect();
        seats.sort();
        Ok(seats)
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;

        let claimed = tables.claimed_seats(booking.showtime_id);
        let conflicts: Vec<SeatCoordinate> = booking
            .coordinates()
            .into_iter()
            .filter(|seat| claimed.contains(seat))
            .collect();
        if !conflicts.is_empty() {
            return Err(RepositoryError::SeatConflict(conflicts));
        }

        let showtime = tables
            .showtimes
            .get_mut(&booking.showtime_id)
            .ok_or(RepositoryError::ShowtimeNotFound(booking.showtime_id))?;

        let requested = booking.seat_count();
        if booking.payment_status.consumes_capacity() {
            if showtime.available_seats < requested {
                return Err(RepositoryError::InsufficientInventory {
                    requested,
                    available: showtime.available_seats,
                });
            }
            showtime.available_seats -= requested;
        }

        tables.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn transition(&self, booking_id: Uuid, change: &StatusChange) -> Result<Booking, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let tables = &mut *tables;

        let booking = tables
            .bookings
            .get_mut(&booking_id)
            .ok_or(RepositoryError::BookingNotFound(booking_id))?;

        let from = booking.payment_status;
        if !change.from.contains(&from) {
            return Err(RepositoryError::StaleStatus {
                id: booking_id,
                actual: from,
                to: change.to,
            });
        }

        let showtime = tables
            .showtimes
            .get_mut(&booking.showtime_id)
            .ok_or_else(|| RepositoryError::Integrity {
                showtime_id: booking.showtime_id,
                detail: format!("booking {} references a missing showtime", booking_id),
            })?;

        let delta = from.available_seat_delta(change.to, booking.seat_count());
        let adjusted = showtime.available_seats + delta;
        if adjusted < 0 || adjusted > showtime.capacity() {
            return Err(RepositoryError::Integrity {
                showtime_id: showtime.id,
                detail: format!(
                    "available_seats would become {} (capacity {})",
                    adjusted,
                    showtime.capacity()
                ),
            });
        }

        showtime.available_seats = adjusted;
        booking.payment_status = change.to;
        booking.updated_at = change.at;
        if change.to == PaymentStatus::Cancelled {
            booking.cancelled_at = Some(change.at);
        }
        if let Some(amount) = change.refund_amount {
            booking.refund_amount = Some(amount);
        }
        Ok(booking.clone())
    }

    async fn stale_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<Booking>, RepositoryError> {
        let tables = self.tables.lock().await;
        let mut stale: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.payment_status == PaymentStatus::Pending && b.booking_date < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|b| b.booking_date);
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::FixedClock;
    use marquee_shared::{BookedSeat, ScreenLayout};

    #[tokio::test]
    async fn test_entries_expire_on_clock() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let store = InMemoryLockStore::with_clock(clock.clone());

        assert!(store.set_if_absent("k", "a", Duration::from_secs(10)).await.unwrap());
        assert!(!store.set_if_absent("k", "b", Duration::from_secs(10)).await.unwrap());

        clock.advance(chrono::Duration::seconds(10));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.refresh_if_equals("k", "a", Duration::from_secs(10)).await.unwrap());
        assert!(store.set_if_absent("k", "b", Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_conditional_delete_checks_value() {
        let store = InMemoryLockStore::new();
        store.set_if_absent("k", "a", Duration::from_secs(60)).await.unwrap();

        assert!(!store.delete_if_equals("k", "b").await.unwrap());
        assert!(store.delete_if_equals("k", "a").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_and_outage() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let store = InMemoryLockStore::with_clock(clock.clone());
        store.set_if_absent("p:1", "a", Duration::from_secs(5)).await.unwrap();
        store.set_if_absent("p:2", "a", Duration::from_secs(50)).await.unwrap();
        store.set_if_absent("q:1", "a", Duration::from_secs(50)).await.unwrap();

        clock.advance(chrono::Duration::seconds(6));
        assert_eq!(store.scan_prefix("p:").await.unwrap(), vec![("p:2".to_string(), "a".to_string())]);
        assert_eq!(store.purge_expired().await.unwrap(), 1);

        store.set_available(false);
        assert!(matches!(store.get("p:2").await, Err(LockStoreError::Unavailable(_))));
    }

    async fn repo_with_showtime(seats_per_row: u32) -> (InMemoryBookingRepository, Uuid) {
        let repo = InMemoryBookingRepository::new();
        let showtime = Showtime::new(
            "Vertigo".to_string(),
            "Screen 3".to_string(),
            Utc::now() + chrono::Duration::days(2),
            ScreenLayout::uniform(1, seats_per_row),
        );
        let id = showtime.id;
        repo.add_showtime(showtime).await;
        (repo, id)
    }

    fn booking(showtime_id: Uuid, seats: &[u32], status: PaymentStatus) -> Booking {
        Booking::new(
            "dave".to_string(),
            showtime_id,
            seats.iter().map(|n| BookedSeat::new(SeatCoordinate::new("A", *n), 500)).collect(),
            "card".to_string(),
            status,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_insert_rejects_overlap_and_keeps_counter() {
        let (repo, showtime_id) = repo_with_showtime(4).await;
        repo.insert_booking(&booking(showtime_id, &[1, 2], PaymentStatus::Paid)).await.unwrap();

        let err = repo
            .insert_booking(&booking(showtime_id, &[2, 3], PaymentStatus::Pending))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::SeatConflict(ref seats) if seats == &[SeatCoordinate::new("A", 2)]));
        assert_eq!(repo.showtime(showtime_id).await.unwrap().available_seats, 2);
    }

    #[tokio::test]
    async fn test_transition_moves_counter_once() {
        let (repo, showtime_id) = repo_with_showtime(4).await;
        let b = booking(showtime_id, &[1, 2, 3], PaymentStatus::Pending);
        repo.insert_booking(&b).await.unwrap();

        let at = Utc::now();
        let failed = repo
            .transition(b.id, &StatusChange::new(&[PaymentStatus::Pending], PaymentStatus::Failed, at))
            .await
            .unwrap();
        assert_eq!(failed.payment_status, PaymentStatus::Failed);
        assert_eq!(repo.showtime(showtime_id).await.unwrap().available_seats, 4);

        let cancelled = repo
            .transition(
                b.id,
                &StatusChange::new(&[PaymentStatus::Failed], PaymentStatus::Cancelled, at).with_refund(0),
            )
            .await
            .unwrap();
        assert_eq!(cancelled.cancelled_at, Some(at));
        assert_eq!(repo.showtime(showtime_id).await.unwrap().available_seats, 4);

        let err = repo
            .transition(b.id, &StatusChange::new(&[PaymentStatus::Pending], PaymentStatus::Paid, at))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::StaleStatus { actual: PaymentStatus::Cancelled, .. }));
    }
}
