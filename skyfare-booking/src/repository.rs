use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skyfare_core::CoreResult;
use uuid::Uuid;

use crate::models::{
    Baggage, Booking, BookingDetail, BookingStats, CancellationSummary, Passenger, Payment,
    SeatAssignment,
};

/// Repository trait for booking data access.
///
/// Every mutating call is one atomic unit: either all of it is visible
/// afterwards or none of it is.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Stores a pending booking with its passengers.
    /// A reference already in use is a `DuplicateReference`.
    async fn create_booking(&self, booking: &Booking, passengers: &[Passenger]) -> CoreResult<()>;

    async fn get_booking(&self, booking_id: Uuid) -> CoreResult<Option<BookingDetail>>;

    /// A user's bookings, newest first.
    async fn list_bookings(&self, user_id: &str) -> CoreResult<Vec<Booking>>;

    /// Gives the passenger the seat if it is still available, releasing any
    /// seat they held before. Returns the released seat.
    async fn assign_seat(
        &self,
        booking_id: Uuid,
        assignment: &SeatAssignment,
    ) -> CoreResult<Option<Uuid>>;

    /// Claims a pending booking for one charge by storing `payment` as
    /// `processing`. A booking that already carries a payment is refused:
    /// `AlreadyPaid` once completed, `StateConflict` while processing.
    async fn begin_payment(&self, payment: &Payment) -> CoreResult<()>;

    /// Completes the processing payment and confirms the booking.
    async fn complete_payment(
        &self,
        booking_id: Uuid,
        transaction_id: &str,
        processed_at: DateTime<Utc>,
    ) -> CoreResult<(Booking, Payment)>;

    /// Drops a processing payment after the charge did not go through.
    async fn abandon_payment(&self, booking_id: Uuid) -> CoreResult<()>;

    /// Cancels an open booking and frees every seat its passengers hold.
    /// Refused while a payment is processing.
    async fn cancel_booking(&self, booking_id: Uuid) -> CoreResult<CancellationSummary>;

    async fn add_baggage(&self, booking_id: Uuid, baggage: &Baggage) -> CoreResult<()>;

    async fn booking_stats(&self, user_id: &str, now: DateTime<Utc>) -> CoreResult<BookingStats>;
}
