use serde::{Deserialize, Serialize};
use std::fmt;

/// One physical seat within a screen layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeatCoordinate {
    pub row: String,
    pub seat_number: u32,
}

impl SeatCoordinate {
    pub fn new(row: impl Into<String>, seat_number: u32) -> Self {
        Self {
            row: row.into(),
            seat_number,
        }
    }
}

impl fmt::Display for SeatCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.row, self.seat_number)
    }
}
