use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use skyfare_booking::models::{payment_conflict, BookingStats, CancellationSummary};
use skyfare_booking::{
    Baggage, Booking, BookingDetail, BookingReference, BookingRepository, BookingStatus, Passenger,
    Payment, SeatAssignment,
};
use skyfare_core::payment::PaymentStatus;
use skyfare_core::{CoreError, CoreResult};
use skyfare_shared::Masked;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::database::{foreign_key_violation, storage_error, unique_violation};

const REFERENCE_CONSTRAINT: &str = "bookings_booking_reference_key";
const PAYMENT_CONSTRAINT: &str = "payments_booking_id_key";

const BOOKING_COLUMNS: &str = "id, user_id, booking_reference, flight_id, seat_class_id, \
                               total_amount, status, created_at, updated_at";

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> CoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(storage_error("Failed to begin transaction"))
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: String,
    booking_reference: String,
    flight_id: Uuid,
    seat_class_id: Uuid,
    total_amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            booking_reference: BookingReference::parse(&row.booking_reference)?,
            flight_id: row.flight_id,
            seat_class_id: row.seat_class_id,
            total_amount: row.total_amount,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PassengerRow {
    id: Uuid,
    booking_id: Uuid,
    first_name: String,
    last_name: String,
    date_of_birth: NaiveDate,
    gender: String,
    passport_number: String,
    nationality: String,
    seat_id: Option<Uuid>,
}

impl TryFrom<PassengerRow> for Passenger {
    type Error = CoreError;

    fn try_from(row: PassengerRow) -> Result<Self, Self::Error> {
        Ok(Passenger {
            id: row.id,
            booking_id: row.booking_id,
            first_name: row.first_name,
            last_name: row.last_name,
            date_of_birth: row.date_of_birth,
            gender: row.gender.parse()?,
            passport_number: Masked(row.passport_number),
            nationality: row.nationality,
            seat_id: row.seat_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    amount: Decimal,
    payment_method: String,
    transaction_id: String,
    status: String,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = CoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            booking_id: row.booking_id,
            amount: row.amount,
            payment_method: row.payment_method.parse()?,
            transaction_id: row.transaction_id,
            status: row.status.parse()?,
            created_at: row.created_at,
            processed_at: row.processed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BaggageRow {
    id: Uuid,
    passenger_id: Uuid,
    weight: Decimal,
    additional_fee: Decimal,
    created_at: DateTime<Utc>,
}

impl From<BaggageRow> for Baggage {
    fn from(row: BaggageRow) -> Self {
        Baggage {
            id: row.id,
            passenger_id: row.passenger_id,
            weight: row.weight,
            additional_fee: row.additional_fee,
            created_at: row.created_at,
        }
    }
}

/// Load a booking row inside `tx` with the given row lock.
async fn lock_booking(
    tx: &mut Transaction<'static, Postgres>,
    booking_id: Uuid,
    lock: &str,
) -> CoreResult<Booking> {
    let sql = format!("SELECT {} FROM bookings WHERE id = $1 {}", BOOKING_COLUMNS, lock);
    let row: Option<BookingRow> = sqlx::query_as(&sql)
        .bind(booking_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage_error("Failed to load booking"))?;

    row.ok_or_else(|| CoreError::not_found("Booking", booking_id))?
        .try_into()
}

async fn payment_status(
    tx: &mut Transaction<'static, Postgres>,
    booking_id: Uuid,
) -> CoreResult<Option<PaymentStatus>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT status FROM payments WHERE booking_id = $1")
        .bind(booking_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage_error("Failed to check payment"))?;
    row.map(|(status,)| status.parse::<PaymentStatus>()).transpose()
}

fn ensure_open(booking: &Booking) -> CoreResult<()> {
    if booking.status.is_open() {
        Ok(())
    } else {
        Err(CoreError::StateConflict(format!(
            "booking {} is {}",
            booking.booking_reference, booking.status
        )))
    }
}

async fn set_status(
    tx: &mut Transaction<'static, Postgres>,
    booking_id: Uuid,
    status: BookingStatus,
) -> CoreResult<Booking> {
    let sql = format!(
        "UPDATE bookings SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
        BOOKING_COLUMNS
    );
    let row: BookingRow = sqlx::query_as(&sql)
        .bind(booking_id)
        .bind(status.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(storage_error("Failed to update booking status"))?;
    row.try_into()
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn create_booking(&self, booking: &Booking, passengers: &[Passenger]) -> CoreResult<()> {
        let mut tx = self.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, booking_reference, flight_id, seat_class_id,
                                  total_amount, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.user_id)
        .bind(booking.booking_reference.as_str())
        .bind(booking.flight_id)
        .bind(booking.seat_class_id)
        .bind(booking.total_amount)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = result {
            return Err(match unique_violation(&e) {
                Some(constraint) if constraint == REFERENCE_CONSTRAINT => {
                    CoreError::DuplicateReference(booking.booking_reference.to_string())
                }
                Some(constraint) => CoreError::ConstraintViolation(constraint),
                None if foreign_key_violation(&e) => CoreError::ConstraintViolation(
                    "booking references an unknown flight or seat class".to_string(),
                ),
                None => storage_error("Failed to insert booking")(e),
            });
        }

        for (position, passenger) in passengers.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO passengers (id, booking_id, position, first_name, last_name,
                                        date_of_birth, gender, passport_number, nationality, seat_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(passenger.id)
            .bind(booking.id)
            .bind(position as i32)
            .bind(&passenger.first_name)
            .bind(&passenger.last_name)
            .bind(passenger.date_of_birth)
            .bind(passenger.gender.as_str())
            .bind(passenger.passport_number.expose())
            .bind(&passenger.nationality)
            .bind(passenger.seat_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error("Failed to insert passenger"))?;
        }

        tx.commit()
            .await
            .map_err(storage_error("Failed to commit booking"))
    }

    async fn get_booking(&self, booking_id: Uuid) -> CoreResult<Option<BookingDetail>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error("Failed to load booking"))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let booking = Booking::try_from(row)?;

        let passengers: Vec<PassengerRow> = sqlx::query_as(
            r#"
            SELECT id, booking_id, first_name, last_name, date_of_birth, gender,
                   passport_number, nationality, seat_id
            FROM passengers
            WHERE booking_id = $1
            ORDER BY position
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error("Failed to load passengers"))?;

        let payment: Option<PaymentRow> = sqlx::query_as(
            r#"
            SELECT id, booking_id, amount, payment_method, transaction_id, status,
                   created_at, processed_at
            FROM payments
            WHERE booking_id = $1
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error("Failed to load payment"))?;

        let baggage: Vec<BaggageRow> = sqlx::query_as(
            r#"
            SELECT bg.id, bg.passenger_id, bg.weight, bg.additional_fee, bg.created_at
            FROM baggage bg
            JOIN passengers p ON p.id = bg.passenger_id
            WHERE p.booking_id = $1
            ORDER BY bg.created_at
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error("Failed to load baggage"))?;

        Ok(Some(BookingDetail {
            booking,
            passengers: passengers
                .into_iter()
                .map(Passenger::try_from)
                .collect::<CoreResult<_>>()?,
            payment: payment.map(Payment::try_from).transpose()?,
            baggage: baggage.into_iter().map(Baggage::from).collect(),
        }))
    }

    async fn list_bookings(&self, user_id: &str) -> CoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
            BOOKING_COLUMNS
        );
        let rows: Vec<BookingRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error("Failed to list bookings"))?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn assign_seat(
        &self,
        booking_id: Uuid,
        assignment: &SeatAssignment,
    ) -> CoreResult<Option<Uuid>> {
        let mut tx = self.begin().await?;

        // Shared lock: assignments may run side by side, cancellation waits.
        let booking = lock_booking(&mut tx, booking_id, "FOR SHARE").await?;
        ensure_open(&booking)?;

        let previous: Option<(Option<Uuid>,)> = sqlx::query_as(
            "SELECT seat_id FROM passengers WHERE id = $1 AND booking_id = $2 FOR UPDATE",
        )
        .bind(assignment.passenger_id)
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_error("Failed to load passenger"))?;
        let (previous,) =
            previous.ok_or_else(|| CoreError::not_found("Passenger", assignment.passenger_id))?;

        let seat: Option<(String,)> =
            sqlx::query_as("SELECT seat_number FROM seats WHERE id = $1 AND flight_id = $2")
                .bind(assignment.seat_id)
                .bind(booking.flight_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_error("Failed to load seat"))?;
        let (seat_number,) = seat.ok_or_else(|| CoreError::not_found("Seat", assignment.seat_id))?;

        if previous == Some(assignment.seat_id) {
            return Ok(None);
        }

        // Compare-and-swap: only one claimant sees the row come back.
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            "UPDATE seats SET is_available = FALSE WHERE id = $1 AND is_available RETURNING id",
        )
        .bind(assignment.seat_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_error("Failed to claim seat"))?;
        if claimed.is_none() {
            return Err(CoreError::SeatUnavailable(seat_number));
        }

        if let Some(old_seat) = previous {
            sqlx::query("UPDATE seats SET is_available = TRUE WHERE id = $1")
                .bind(old_seat)
                .execute(&mut *tx)
                .await
                .map_err(storage_error("Failed to release seat"))?;
        }

        let linked = sqlx::query("UPDATE passengers SET seat_id = $1 WHERE id = $2")
            .bind(assignment.seat_id)
            .bind(assignment.passenger_id)
            .execute(&mut *tx)
            .await;
        if let Err(e) = linked {
            if unique_violation(&e).is_some() {
                return Err(CoreError::SeatUnavailable(seat_number));
            }
            return Err(storage_error("Failed to link seat")(e));
        }

        tx.commit()
            .await
            .map_err(storage_error("Failed to commit seat assignment"))?;
        Ok(previous)
    }

    async fn begin_payment(&self, payment: &Payment) -> CoreResult<()> {
        let mut tx = self.begin().await?;

        let booking = lock_booking(&mut tx, payment.booking_id, "FOR UPDATE").await?;
        let reference = booking.booking_reference.to_string();
        if let Some(status) = payment_status(&mut tx, payment.booking_id).await? {
            return Err(payment_conflict(&reference, status));
        }
        booking.status.transition_to(BookingStatus::Confirmed)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO payments (id, booking_id, amount, payment_method, transaction_id,
                                  status, created_at, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NULL)
            "#,
        )
        .bind(payment.id)
        .bind(payment.booking_id)
        .bind(payment.amount)
        .bind(payment.payment_method.as_str())
        .bind(&payment.transaction_id)
        .bind(PaymentStatus::Processing.as_str())
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            return Err(match unique_violation(&e) {
                Some(constraint) if constraint == PAYMENT_CONSTRAINT => {
                    payment_conflict(&reference, PaymentStatus::Processing)
                }
                Some(constraint) => CoreError::ConstraintViolation(constraint),
                None => storage_error("Failed to insert payment")(e),
            });
        }

        tx.commit()
            .await
            .map_err(storage_error("Failed to commit payment claim"))
    }

    async fn complete_payment(
        &self,
        booking_id: Uuid,
        transaction_id: &str,
        processed_at: DateTime<Utc>,
    ) -> CoreResult<(Booking, Payment)> {
        let mut tx = self.begin().await?;

        let booking = lock_booking(&mut tx, booking_id, "FOR UPDATE").await?;
        let next = booking.status.transition_to(BookingStatus::Confirmed)?;

        let row: Option<PaymentRow> = sqlx::query_as(
            r#"
            UPDATE payments
            SET status = $2, transaction_id = $3, processed_at = $4
            WHERE booking_id = $1 AND status = $5
            RETURNING id, booking_id, amount, payment_method, transaction_id, status,
                      created_at, processed_at
            "#,
        )
        .bind(booking_id)
        .bind(PaymentStatus::Completed.as_str())
        .bind(transaction_id)
        .bind(processed_at)
        .bind(PaymentStatus::Processing.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_error("Failed to complete payment"))?;

        let payment: Payment = row
            .ok_or_else(|| {
                CoreError::StateConflict(format!(
                    "no payment in progress for booking {}",
                    booking.booking_reference
                ))
            })?
            .try_into()?;

        let confirmed = set_status(&mut tx, booking_id, next).await?;
        tx.commit()
            .await
            .map_err(storage_error("Failed to commit payment"))?;
        Ok((confirmed, payment))
    }

    async fn abandon_payment(&self, booking_id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM payments WHERE booking_id = $1 AND status = $2")
            .bind(booking_id)
            .bind(PaymentStatus::Processing.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage_error("Failed to drop payment"))?;
        Ok(())
    }

    async fn cancel_booking(&self, booking_id: Uuid) -> CoreResult<CancellationSummary> {
        let mut tx = self.begin().await?;

        let booking = lock_booking(&mut tx, booking_id, "FOR UPDATE").await?;
        if payment_status(&mut tx, booking_id).await? == Some(PaymentStatus::Processing) {
            return Err(payment_conflict(
                &booking.booking_reference.to_string(),
                PaymentStatus::Processing,
            ));
        }
        let next = booking.status.transition_to(BookingStatus::Cancelled)?;

        let released: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE seats SET is_available = TRUE
            WHERE id IN (SELECT seat_id FROM passengers WHERE booking_id = $1 AND seat_id IS NOT NULL)
            RETURNING id
            "#,
        )
        .bind(booking_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage_error("Failed to release seats"))?;

        sqlx::query("UPDATE passengers SET seat_id = NULL WHERE booking_id = $1")
            .bind(booking_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error("Failed to clear seat links"))?;

        let cancelled = set_status(&mut tx, booking_id, next).await?;
        tx.commit()
            .await
            .map_err(storage_error("Failed to commit cancellation"))?;

        Ok(CancellationSummary {
            booking: cancelled,
            released_seats: released.into_iter().map(|(id,)| id).collect(),
        })
    }

    async fn add_baggage(&self, booking_id: Uuid, baggage: &Baggage) -> CoreResult<()> {
        let mut tx = self.begin().await?;

        let booking = lock_booking(&mut tx, booking_id, "FOR SHARE").await?;
        ensure_open(&booking)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO baggage (id, passenger_id, weight, additional_fee, created_at)
            SELECT $1, p.id, $3, $4, $5
            FROM passengers p
            WHERE p.id = $2 AND p.booking_id = $6
            "#,
        )
        .bind(baggage.id)
        .bind(baggage.passenger_id)
        .bind(baggage.weight)
        .bind(baggage.additional_fee)
        .bind(baggage.created_at)
        .bind(booking_id)
        .execute(&mut *tx)
        .await
        .map_err(storage_error("Failed to insert baggage"))?;

        if inserted.rows_affected() == 0 {
            return Err(CoreError::not_found("Passenger", baggage.passenger_id));
        }

        tx.commit()
            .await
            .map_err(storage_error("Failed to commit baggage"))
    }

    async fn booking_stats(&self, user_id: &str, now: DateTime<Utc>) -> CoreResult<BookingStats> {
        let (total_bookings, upcoming_trips): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE b.status = 'confirmed' AND f.departure_time > $2)
            FROM bookings b
            JOIN flights f ON f.id = b.flight_id
            WHERE b.user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error("Failed to load booking stats"))?;

        Ok(BookingStats {
            total_bookings,
            upcoming_trips,
        })
    }
}
