use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::seat::SeatCoordinate;

/// A row of consecutively numbered seats, starting at 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatRow {
    pub label: String,
    pub seats: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ScreenLayout {
    pub rows: Vec<SeatRow>,
}

impl ScreenLayout {
    /// Uniform layout: `rows` labelled A, B, C... each with `seats_per_row` seats.
    pub fn uniform(rows: u8, seats_per_row: u32) -> Self {
        let rows = (0..rows.min(26))
            .map(|i| SeatRow {
                label: char::from(b'A' + i).to_string(),
                seats: seats_per_row,
            })
            .collect();
        Self { rows }
    }

    pub fn capacity(&self) -> i32 {
        self.rows.iter().map(|r| r.seats as i32).sum()
    }

    pub fn contains(&self, seat: &SeatCoordinate) -> bool {
        self.rows
            .iter()
            .any(|r| r.label == seat.row && seat.seat_number >= 1 && seat.seat_number <= r.seats)
    }

    pub fn seats(&self) -> Vec<SeatCoordinate> {
        self.rows
            .iter()
            .flat_map(|r| (1..=r.seats).map(move |n| SeatCoordinate::new(r.label.clone(), n)))
            .collect()
    }
}

/// One scheduled screening. `available_seats` is maintained by the booking finalizer only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Showtime {
    pub id: Uuid,
    pub movie_title: String,
    pub screen_name: String,
    pub start_time: DateTime<Utc>,
    pub layout: ScreenLayout,
    pub available_seats: i32,
}

impl Showtime {
    pub fn new(movie_title: String, screen_name: String, start_time: DateTime<Utc>, layout: ScreenLayout) -> Self {
        let available_seats = layout.capacity();
        Self {
            id: Uuid::new_v4(),
            movie_title,
            screen_name,
            start_time,
            layout,
            available_seats,
        }
    }

    pub fn capacity(&self) -> i32 {
        self.layout.capacity()
    }
}
