use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use marquee_core::{BookingError, Clock, CoreResult, LockStore, LockStoreError, SEAT_LOCK_TTL_SECONDS};
use marquee_shared::{Masked, SeatCoordinate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::breaker::CircuitBreaker;

const KEY_PREFIX: &str = "seatlock";

/// Value stored under a seat lock key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockEntry {
    pub holder_user_id: String,
    pub acquired_at: DateTime<Utc>,
}

/// A live hold on one seat, as read back from the lock store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatLock {
    pub showtime_id: Uuid,
    pub seat: SeatCoordinate,
    pub holder_user_id: String,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AcquireResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locked_seats: Vec<SeatCoordinate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contested_seats: Vec<SeatCoordinate>,
    pub expires_in_seconds: u64,
    /// Set when the lock store could not be reached and no hold was taken.
    #[serde(default)]
    pub lock_bypassed: bool,
}

impl AcquireResult {
    fn held(seats: Vec<SeatCoordinate>) -> Self {
        Self {
            success: true,
            locked_seats: seats,
            contested_seats: Vec::new(),
            expires_in_seconds: SEAT_LOCK_TTL_SECONDS,
            lock_bypassed: false,
        }
    }

    fn contested(seats: Vec<SeatCoordinate>) -> Self {
        Self {
            success: false,
            locked_seats: Vec::new(),
            contested_seats: seats,
            expires_in_seconds: SEAT_LOCK_TTL_SECONDS,
            lock_bypassed: false,
        }
    }

    fn bypassed(seats: Vec<SeatCoordinate>) -> Self {
        Self {
            lock_bypassed: true,
            ..Self::held(seats)
        }
    }
}

pub fn seat_lock_key(showtime_id: Uuid, seat: &SeatCoordinate) -> String {
    format!("{}:{}:{}:{}", KEY_PREFIX, showtime_id, seat.row, seat.seat_number)
}

fn showtime_prefix(showtime_id: Uuid) -> String {
    format!("{}:{}:", KEY_PREFIX, showtime_id)
}

fn seat_from_key(prefix: &str, key: &str) -> Option<SeatCoordinate> {
    let rest = key.strip_prefix(prefix)?;
    let (row, number) = rest.rsplit_once(':')?;
    Some(SeatCoordinate::new(row, number.parse().ok()?))
}

fn parse_entry(key: &str, raw: &str) -> Result<LockEntry, LockStoreError> {
    serde_json::from_str(raw).map_err(|e| LockStoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn dedup(seats: &[SeatCoordinate]) -> Vec<SeatCoordinate> {
    let mut unique: Vec<SeatCoordinate> = Vec::with_capacity(seats.len());
    for seat in seats {
        if !unique.contains(seat) {
            unique.push(seat.clone());
        }
    }
    unique
}

enum SeatOutcome {
    NewlyAcquired,
    Renewed,
    Contested,
}

/// Short-lived exclusive holds on seats, one lock-store key per
/// `(showtime, row, seat)`. Store failures never escape this type: they
/// switch the caller to degraded mode instead.
pub struct SeatLockManager {
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    breaker: CircuitBreaker,
    ttl: Duration,
}

impl SeatLockManager {
    pub fn new(store: Arc<dyn LockStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_breaker(store, clock, 5, Duration::from_secs(30))
    }

    pub fn with_breaker(
        store: Arc<dyn LockStore>,
        clock: Arc<dyn Clock>,
        failure_threshold: usize,
        reset_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            breaker: CircuitBreaker::new("lock-store", failure_threshold, reset_timeout),
            ttl: Duration::from_secs(SEAT_LOCK_TTL_SECONDS),
        }
    }

    /// Hold every seat in `seats` for `user_id`, or none of them.
    pub async fn acquire(&self, showtime_id: Uuid, seats: &[SeatCoordinate], user_id: &str) -> CoreResult<AcquireResult> {
        if seats.is_empty() {
            return Err(BookingError::InvalidSeats("at least one seat is required".to_string()));
        }
        let seats = dedup(seats);

        if !self.breaker.check().await {
            warn!(%showtime_id, "Lock store circuit open, bypassing seat locks");
            return Ok(AcquireResult::bypassed(seats));
        }

        let entry = LockEntry {
            holder_user_id: user_id.to_string(),
            acquired_at: self.clock.now(),
        };
        let value = serde_json::to_string(&entry).map_err(|e| BookingError::Integrity(e.to_string()))?;

        let mut newly_acquired = Vec::new();
        let mut held = Vec::new();
        let mut contested = Vec::new();

        for seat in &seats {
            match self.try_hold(showtime_id, seat, user_id, &value).await {
                Ok(SeatOutcome::NewlyAcquired) => {
                    newly_acquired.push(seat.clone());
                    held.push(seat.clone());
                }
                Ok(SeatOutcome::Renewed) => held.push(seat.clone()),
                Ok(SeatOutcome::Contested) => contested.push(seat.clone()),
                Err(err) => {
                    self.breaker.record_failure().await;
                    self.roll_back(showtime_id, &newly_acquired, &value).await;
                    // A seat already seen held by someone else still fails the batch.
                    if !contested.is_empty() {
                        warn!(
                            %showtime_id,
                            error = %err,
                            contested = contested.len(),
                            "Lock store error after contention, rejecting hold"
                        );
                        return Ok(AcquireResult::contested(contested));
                    }
                    warn!(%showtime_id, error = %err, "Lock store unavailable, bypassing seat locks");
                    return Ok(AcquireResult::bypassed(seats));
                }
            }
        }
        self.breaker.record_success().await;

        if !contested.is_empty() {
            self.roll_back(showtime_id, &newly_acquired, &value).await;
            warn!(
                %showtime_id,
                user = %Masked(user_id),
                contested = contested.len(),
                released = newly_acquired.len(),
                "Seat hold rejected, seats held by another user"
            );
            return Ok(AcquireResult::contested(contested));
        }

        info!(%showtime_id, user = %Masked(user_id), seats = held.len(), "Seats held");
        Ok(AcquireResult::held(held))
    }

    async fn try_hold(
        &self,
        showtime_id: Uuid,
        seat: &SeatCoordinate,
        user_id: &str,
        value: &str,
    ) -> Result<SeatOutcome, LockStoreError> {
        let key = seat_lock_key(showtime_id, seat);

        // A lock can expire between the failed SET and the read; one retry covers it.
        for _ in 0..2 {
            if self.store.set_if_absent(&key, value, self.ttl).await? {
                return Ok(SeatOutcome::NewlyAcquired);
            }

            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };

            let existing = match parse_entry(&key, &raw) {
                Ok(existing) => existing,
                Err(err) => {
                    warn!(error = %err, "Unreadable seat lock, treating seat as contested");
                    return Ok(SeatOutcome::Contested);
                }
            };

            if existing.holder_user_id != user_id {
                return Ok(SeatOutcome::Contested);
            }

            if self.store.refresh_if_equals(&key, &raw, self.ttl).await? {
                debug!(%key, "Seat hold renewed");
                return Ok(SeatOutcome::Renewed);
            }
        }

        Ok(SeatOutcome::Contested)
    }

    /// Compensating delete for seats this call created. Only removes entries
    /// still carrying this call's value.
    async fn roll_back(&self, showtime_id: Uuid, seats: &[SeatCoordinate], value: &str) {
        for seat in seats {
            let key = seat_lock_key(showtime_id, seat);
            if let Err(err) = self.store.delete_if_equals(&key, value).await {
                warn!(%key, error = %err, "Failed to roll back seat hold, it will expire on its own");
            }
        }
    }

    /// Release holds. With `user_id`, only that user's holds go; without it,
    /// every named hold is removed. Missing or expired holds are ignored.
    pub async fn release(&self, showtime_id: Uuid, seats: &[SeatCoordinate], user_id: Option<&str>) -> usize {
        if !self.breaker.check().await {
            warn!(%showtime_id, "Lock store circuit open, skipping release");
            return 0;
        }

        let mut released = 0;
        for seat in seats {
            let key = seat_lock_key(showtime_id, seat);
            let result = match user_id {
                None => self.store.delete(&key).await,
                Some(user_id) => self.release_owned(&key, user_id).await,
            };
            match result {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(err) => {
                    self.breaker.record_failure().await;
                    warn!(%key, error = %err, "Failed to release seat hold");
                }
            }
        }

        if released > 0 {
            debug!(%showtime_id, released, "Seat holds released");
        }
        released
    }

    async fn release_owned(&self, key: &str, user_id: &str) -> Result<bool, LockStoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(false);
        };
        match parse_entry(key, &raw) {
            Ok(entry) if entry.holder_user_id == user_id => self.store.delete_if_equals(key, &raw).await,
            Ok(_) => Ok(false),
            Err(err) => {
                warn!(error = %err, "Unreadable seat lock left in place");
                Ok(false)
            }
        }
    }

    /// Reset the TTL on the seats `user_id` still holds. Returns the seats extended.
    pub async fn extend(&self, showtime_id: Uuid, seats: &[SeatCoordinate], user_id: &str) -> Vec<SeatCoordinate> {
        if !self.breaker.check().await {
            return Vec::new();
        }

        let mut extended = Vec::new();
        for seat in seats {
            let key = seat_lock_key(showtime_id, seat);
            match self.extend_owned(&key, user_id).await {
                Ok(true) => extended.push(seat.clone()),
                Ok(false) => {}
                Err(err) => {
                    self.breaker.record_failure().await;
                    warn!(%key, error = %err, "Failed to extend seat hold");
                }
            }
        }
        extended
    }

    async fn extend_owned(&self, key: &str, user_id: &str) -> Result<bool, LockStoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(false);
        };
        match parse_entry(key, &raw) {
            Ok(entry) if entry.holder_user_id == user_id => self.store.refresh_if_equals(key, &raw, self.ttl).await,
            _ => Ok(false),
        }
    }

    /// Every live hold for the showtime. Errors mean the lock state is unknown.
    pub async fn active_locks(&self, showtime_id: Uuid) -> Result<Vec<SeatLock>, LockStoreError> {
        if !self.breaker.check().await {
            return Err(LockStoreError::Unavailable("circuit open".to_string()));
        }

        let prefix = showtime_prefix(showtime_id);
        let entries = match self.store.scan_prefix(&prefix).await {
            Ok(entries) => {
                self.breaker.record_success().await;
                entries
            }
            Err(err) => {
                self.breaker.record_failure().await;
                return Err(err);
            }
        };

        let mut locks = Vec::with_capacity(entries.len());
        for (key, raw) in entries {
            let (Some(seat), Ok(entry)) = (seat_from_key(&prefix, &key), parse_entry(&key, &raw)) else {
                warn!(%key, "Skipping unreadable seat lock");
                continue;
            };
            locks.push(SeatLock {
                showtime_id,
                seat,
                holder_user_id: entry.holder_user_id,
                acquired_at: entry.acquired_at,
            });
        }
        Ok(locks)
    }

    /// Reclaim expired entries on backends without native expiry.
    pub async fn sweep(&self) -> usize {
        match self.store.purge_expired().await {
            Ok(purged) => purged,
            Err(err) => {
                warn!(error = %err, "Lock store sweep failed");
                0
            }
        }
    }
}
