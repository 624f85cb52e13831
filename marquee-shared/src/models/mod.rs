pub mod booking;
pub mod events;
pub mod seat;
pub mod showtime;
