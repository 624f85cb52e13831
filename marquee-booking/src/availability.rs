use std::collections::HashSet;
use std::sync::Arc;

use marquee_core::{BookingError, BookingRepository, CoreResult, SeatConflict};
use marquee_shared::SeatCoordinate;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::lock_manager::SeatLockManager;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeatState {
    Available,
    Locked,
    Booked,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatStatus {
    #[serde(flatten)]
    pub seat: SeatCoordinate,
    pub state: SeatState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatMap {
    pub showtime_id: Uuid,
    pub capacity: i32,
    pub available_seats: i32,
    /// False when the lock store could not be read and holds are not shown.
    pub locks_known: bool,
    pub seats: Vec<SeatStatus>,
}

impl SeatMap {
    pub fn state_of(&self, seat: &SeatCoordinate) -> Option<SeatState> {
        self.seats.iter().find(|s| &s.seat == seat).map(|s| s.state)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatCheck {
    pub available: bool,
    pub unavailable_seats: Vec<SeatConflict>,
}

/// Read-only merge of live holds and persisted bookings.
pub struct AvailabilityReconciler {
    locks: Arc<SeatLockManager>,
    bookings: Arc<dyn BookingRepository>,
}

impl AvailabilityReconciler {
    pub fn new(locks: Arc<SeatLockManager>, bookings: Arc<dyn BookingRepository>) -> Self {
        Self { locks, bookings }
    }

    pub async fn get_seat_map(&self, showtime_id: Uuid) -> CoreResult<SeatMap> {
        let showtime = self
            .bookings
            .get_showtime(showtime_id)
            .await?
            .ok_or(BookingError::ShowtimeNotFound(showtime_id))?;

        let booked: HashSet<SeatCoordinate> = self.bookings.active_seats(showtime_id).await?.into_iter().collect();
        let (held, locks_known) = self.held_seats(showtime_id, None).await;

        let seats = showtime
            .layout
            .seats()
            .into_iter()
            .map(|seat| {
                let state = if booked.contains(&seat) {
                    SeatState::Booked
                } else if held.contains(&seat) {
                    SeatState::Locked
                } else {
                    SeatState::Available
                };
                SeatStatus { seat, state }
            })
            .collect();

        Ok(SeatMap {
            showtime_id,
            capacity: showtime.capacity(),
            available_seats: showtime.available_seats,
            locks_known,
            seats,
        })
    }

    /// Pre-flight check before acquiring holds.
    pub async fn check_requested_seats(&self, showtime_id: Uuid, seats: &[SeatCoordinate]) -> CoreResult<SeatCheck> {
        self.check(showtime_id, seats, None).await
    }

    /// Like [`check_requested_seats`](Self::check_requested_seats), but holds
    /// belonging to `user_id` do not count against the request.
    pub async fn check_requested_seats_for(
        &self,
        showtime_id: Uuid,
        seats: &[SeatCoordinate],
        user_id: &str,
    ) -> CoreResult<SeatCheck> {
        self.check(showtime_id, seats, Some(user_id)).await
    }

    async fn check(&self, showtime_id: Uuid, seats: &[SeatCoordinate], user_id: Option<&str>) -> CoreResult<SeatCheck> {
        let booked: HashSet<SeatCoordinate> = self.bookings.active_seats(showtime_id).await?.into_iter().collect();
        let (held, _) = self.held_seats(showtime_id, user_id).await;

        let mut unavailable_seats = Vec::new();
        for seat in seats {
            if booked.contains(seat) {
                unavailable_seats.push(SeatConflict::booked(seat.clone()));
            } else if held.contains(seat) {
                unavailable_seats.push(SeatConflict::locked(seat.clone()));
            }
        }

        Ok(SeatCheck {
            available: unavailable_seats.is_empty(),
            unavailable_seats,
        })
    }

    /// Seats held by someone other than `exclude_user`. An unreadable lock
    /// store yields no holds.
    async fn held_seats(&self, showtime_id: Uuid, exclude_user: Option<&str>) -> (HashSet<SeatCoordinate>, bool) {
        match self.locks.active_locks(showtime_id).await {
            Ok(locks) => {
                let held = locks
                    .into_iter()
                    .filter(|l| exclude_user != Some(l.holder_user_id.as_str()))
                    .map(|l| l.seat)
                    .collect();
                (held, true)
            }
            Err(err) => {
                warn!(%showtime_id, error = %err, "Lock state unknown, reporting held seats as available");
                (HashSet::new(), false)
            }
        }
    }
}
