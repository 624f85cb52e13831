use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_core::{BookingRepository, RepositoryError, StatusChange};
use marquee_shared::{BookedSeat, Booking, PaymentStatus, ScreenLayout, SeatCoordinate, Showtime};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use tracing::{debug, error};
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_showtime(&self, showtime: &Showtime) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO showtimes (id, movie_title, screen_name, start_time, layout, capacity, available_seats)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(showtime.id)
        .bind(&showtime.movie_title)
        .bind(&showtime.screen_name)
        .bind(showtime.start_time)
        .bind(Json(&showtime.layout))
        .bind(showtime.capacity())
        .bind(showtime.available_seats)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn load_seats<'e, E>(executor: E, booking_id: Uuid) -> Result<Vec<BookedSeat>, RepositoryError>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let rows: Vec<SeatRowRecord> = sqlx::query_as(
            "SELECT seat_row, seat_number, price FROM booking_seats WHERE booking_id = $1 ORDER BY seat_row, seat_number",
        )
        .bind(booking_id)
        .fetch_all(executor)
        .await
        .map_err(backend)?;

        rows.into_iter().map(SeatRowRecord::into_seat).collect()
    }
}

#[derive(sqlx::FromRow)]
struct ShowtimeRow {
    id: Uuid,
    movie_title: String,
    screen_name: String,
    start_time: DateTime<Utc>,
    layout: Json<ScreenLayout>,
    available_seats: i32,
}

impl From<ShowtimeRow> for Showtime {
    fn from(row: ShowtimeRow) -> Self {
        Showtime {
            id: row.id,
            movie_title: row.movie_title,
            screen_name: row.screen_name,
            start_time: row.start_time,
            layout: row.layout.0,
            available_seats: row.available_seats,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: String,
    showtime_id: Uuid,
    total_amount: i64,
    payment_method: String,
    payment_status: String,
    booking_date: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    refund_amount: Option<i64>,
    updated_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self, seats: Vec<BookedSeat>) -> Result<Booking, RepositoryError> {
        let payment_status: PaymentStatus = self
            .payment_status
            .parse()
            .map_err(|e: String| RepositoryError::Backend(format!("booking {}: {}", self.id, e)))?;
        Ok(Booking {
            id: self.id,
            user_id: self.user_id,
            showtime_id: self.showtime_id,
            seats,
            total_amount: self.total_amount,
            payment_method: self.payment_method,
            payment_status,
            booking_date: self.booking_date,
            cancelled_at: self.cancelled_at,
            refund_amount: self.refund_amount,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SeatRowRecord {
    seat_row: String,
    seat_number: i32,
    price: i64,
}

impl SeatRowRecord {
    fn into_seat(self) -> Result<BookedSeat, RepositoryError> {
        let seat_number = u32::try_from(self.seat_number)
            .map_err(|_| RepositoryError::Backend(format!("invalid seat number {}", self.seat_number)))?;
        Ok(BookedSeat {
            row: self.seat_row,
            seat_number,
            price: self.price,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CounterRow {
    available_seats: i32,
    capacity: i32,
}

const BOOKING_COLUMNS: &str = "id, user_id, showtime_id, total_amount, payment_method, payment_status, \
                               booking_date, cancelled_at, refund_amount, updated_at";

fn backend(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Backend(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

async fn lock_counter(
    tx: &mut Transaction<'_, Postgres>,
    showtime_id: Uuid,
) -> Result<Option<CounterRow>, RepositoryError> {
    sqlx::query_as("SELECT available_seats, capacity FROM showtimes WHERE id = $1 FOR UPDATE")
        .bind(showtime_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(backend)
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn get_showtime(&self, id: Uuid) -> Result<Option<Showtime>, RepositoryError> {
        let row: Option<ShowtimeRow> = sqlx::query_as(
            "SELECT id, movie_title, screen_name, start_time, layout, available_seats FROM showtimes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(Showtime::from))
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, RepositoryError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(row) => {
                let seats = Self::load_seats(&self.pool, row.id).await?;
                row.into_booking(seats).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn active_seats(&self, showtime_id: Uuid) -> Result<Vec<SeatCoordinate>, RepositoryError> {
        let rows: Vec<(String, i32)> = sqlx::query_as(
            "SELECT seat_row, seat_number FROM booking_seats WHERE showtime_id = $1 AND active ORDER BY seat_row, seat_number",
        )
        .bind(showtime_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .into_iter()
            .filter_map(|(row, n)| u32::try_from(n).ok().map(|n| SeatCoordinate::new(row, n)))
            .collect())
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Every insert takes the showtime row lock first, so the overlap check
        // below sees all committed claims.
        let counter = lock_counter(&mut tx, booking.showtime_id)
            .await?
            .ok_or(RepositoryError::ShowtimeNotFound(booking.showtime_id))?;

        let claimed: Vec<(String, i32)> = sqlx::query_as(
            "SELECT seat_row, seat_number FROM booking_seats WHERE showtime_id = $1 AND active",
        )
        .bind(booking.showtime_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(backend)?;
        let claimed: HashSet<(String, i32)> = claimed.into_iter().collect();

        let conflicts: Vec<SeatCoordinate> = booking
            .coordinates()
            .into_iter()
            .filter(|s| claimed.contains(&(s.row.clone(), s.seat_number as i32)))
            .collect();
        if !conflicts.is_empty() {
            return Err(RepositoryError::SeatConflict(conflicts));
        }

        let active = booking.payment_status.consumes_capacity();
        let requested = booking.seat_count();
        if active {
            if counter.available_seats < requested {
                return Err(RepositoryError::InsufficientInventory {
                    requested,
                    available: counter.available_seats,
                });
            }
            sqlx::query("UPDATE showtimes SET available_seats = available_seats - $2 WHERE id = $1")
                .bind(booking.showtime_id)
                .bind(requested)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }

        sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, showtime_id, total_amount, payment_method, payment_status,
                                  booking_date, cancelled_at, refund_amount, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.user_id)
        .bind(booking.showtime_id)
        .bind(booking.total_amount)
        .bind(&booking.payment_method)
        .bind(booking.payment_status.as_str())
        .bind(booking.booking_date)
        .bind(booking.cancelled_at)
        .bind(booking.refund_amount)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        for seat in &booking.seats {
            let inserted = sqlx::query(
                r#"
                INSERT INTO booking_seats (booking_id, showtime_id, seat_row, seat_number, price, active)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(booking.id)
            .bind(booking.showtime_id)
            .bind(&seat.row)
            .bind(seat.seat_number as i32)
            .bind(seat.price)
            .bind(active)
            .execute(&mut *tx)
            .await;

            if let Err(e) = inserted {
                return Err(if is_unique_violation(&e) {
                    RepositoryError::SeatConflict(vec![seat.coordinate()])
                } else {
                    backend(e)
                });
            }
        }

        tx.commit().await.map_err(backend)?;
        debug!(booking_id = %booking.id, seats = requested, "Booking row written");
        Ok(())
    }

    async fn transition(&self, booking_id: Uuid, change: &StatusChange) -> Result<Booking, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1 FOR UPDATE", BOOKING_COLUMNS))
                .bind(booking_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;
        let row = row.ok_or(RepositoryError::BookingNotFound(booking_id))?;
        let seats = Self::load_seats(&mut *tx, booking_id).await?;
        let mut booking = row.into_booking(seats)?;

        let from = booking.payment_status;
        if !change.from.contains(&from) {
            return Err(RepositoryError::StaleStatus {
                id: booking_id,
                actual: from,
                to: change.to,
            });
        }

        let counter = lock_counter(&mut tx, booking.showtime_id).await?.ok_or_else(|| {
            RepositoryError::Integrity {
                showtime_id: booking.showtime_id,
                detail: format!("booking {} references a missing showtime", booking_id),
            }
        })?;

        let delta = from.available_seat_delta(change.to, booking.seat_count());
        let adjusted = counter.available_seats + delta;
        if adjusted < 0 || adjusted > counter.capacity {
            error!(
                showtime_id = %booking.showtime_id,
                adjusted,
                capacity = counter.capacity,
                "Seat counter out of range, rolling back"
            );
            return Err(RepositoryError::Integrity {
                showtime_id: booking.showtime_id,
                detail: format!("available_seats would become {} (capacity {})", adjusted, counter.capacity),
            });
        }

        if delta != 0 {
            sqlx::query("UPDATE showtimes SET available_seats = $2 WHERE id = $1")
                .bind(booking.showtime_id)
                .bind(adjusted)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            sqlx::query("UPDATE booking_seats SET active = $2 WHERE booking_id = $1")
                .bind(booking_id)
                .bind(change.to.consumes_capacity())
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }

        booking.payment_status = change.to;
        booking.updated_at = change.at;
        if change.to == PaymentStatus::Cancelled {
            booking.cancelled_at = Some(change.at);
        }
        if let Some(amount) = change.refund_amount {
            booking.refund_amount = Some(amount);
        }

        sqlx::query(
            r#"
            UPDATE bookings
            SET payment_status = $2, updated_at = $3, cancelled_at = $4, refund_amount = $5
            WHERE id = $1
            "#,
        )
        .bind(booking_id)
        .bind(booking.payment_status.as_str())
        .bind(booking.updated_at)
        .bind(booking.cancelled_at)
        .bind(booking.refund_amount)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(booking)
    }

    async fn stale_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<Booking>, RepositoryError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE payment_status = 'pending' AND booking_date < $1 ORDER BY booking_date",
            BOOKING_COLUMNS
        ))
        .bind(older_than)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut bookings = Vec::with_capacity(rows.len());
        for row in rows {
            let seats = Self::load_seats(&self.pool, row.id).await?;
            bookings.push(row.into_booking(seats)?);
        }
        Ok(bookings)
    }
}
