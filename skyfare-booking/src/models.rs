use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use skyfare_core::payment::{PaymentMethod, PaymentStatus};
use skyfare_core::{CoreError, CoreResult};
use skyfare_shared::Masked;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::reference::BookingReference;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    /// pending → confirmed | cancelled, confirmed → cancelled | completed.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }

    pub fn transition_to(&self, next: BookingStatus) -> CoreResult<BookingStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::invalid_transition(self, next))
        }
    }

    /// Seats and baggage can still change.
    pub fn is_open(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(CoreError::ValidationError(format!(
                "unknown booking status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Gender {
    #[default]
    M,
    F,
    O,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::M => "M",
            Gender::F => "F",
            Gender::O => "O",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "M" | "MALE" => Ok(Gender::M),
            "F" | "FEMALE" => Ok(Gender::F),
            "O" | "OTHER" => Ok(Gender::O),
            other => Err(CoreError::ValidationError(format!(
                "unknown gender '{}'",
                other
            ))),
        }
    }
}

/// The single source of truth for a customer's reservation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: String,
    pub booking_reference: BookingReference,
    pub flight_id: Uuid,
    pub seat_class_id: Uuid,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        user_id: String,
        booking_reference: BookingReference,
        flight_id: Uuid,
        seat_class_id: Uuid,
        total_amount: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            booking_reference,
            flight_id,
            seat_class_id,
            total_amount,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update booking status, enforcing the lifecycle.
    pub fn update_status(&mut self, next: BookingStatus) -> CoreResult<()> {
        self.status = self.status.transition_to(next)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Traveller data as submitted, before it is attached to a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassengerDetails {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub passport_number: Masked<String>,
    pub nationality: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passenger {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub passport_number: Masked<String>,
    pub nationality: String,
    /// Cleared, never deleted, when the booking is cancelled.
    pub seat_id: Option<Uuid>,
}

impl Passenger {
    pub fn new(booking_id: Uuid, details: PassengerDetails) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            first_name: details.first_name,
            last_name: details.last_name,
            date_of_birth: details.date_of_birth,
            gender: details.gender,
            passport_number: details.passport_number,
            nationality: details.nationality,
            seat_id: None,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Error for a charge attempt on a booking that already has a payment in
/// `status`: still processing is a conflict, anything else counts as paid.
pub fn payment_conflict(reference: &str, status: PaymentStatus) -> CoreError {
    match status {
        PaymentStatus::Pending | PaymentStatus::Processing => CoreError::StateConflict(format!(
            "payment for booking {} is already in progress",
            reference
        )),
        _ => CoreError::AlreadyPaid(reference.to_string()),
    }
}

/// A checked bag. `additional_fee` covers weight above the class allowance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Baggage {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub weight: Decimal,
    pub additional_fee: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingDetail {
    pub booking: Booking,
    pub passengers: Vec<Passenger>,
    pub payment: Option<Payment>,
    pub baggage: Vec<Baggage>,
}

impl BookingDetail {
    pub fn passenger(&self, passenger_id: Uuid) -> Option<&Passenger> {
        self.passengers.iter().find(|p| p.id == passenger_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatAssignment {
    pub passenger_id: Uuid,
    pub seat_id: Uuid,
}

/// Result of one (passenger, seat) pair in an assignment batch.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOutcome {
    pub passenger_id: Uuid,
    pub seat_id: Uuid,
    pub assigned: bool,
    /// Seat the passenger held before, now released.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_seat_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl AssignmentOutcome {
    pub fn assigned(assignment: SeatAssignment, released_seat_id: Option<Uuid>) -> Self {
        Self {
            passenger_id: assignment.passenger_id,
            seat_id: assignment.seat_id,
            assigned: true,
            released_seat_id,
            error: None,
            code: None,
        }
    }

    pub fn failed(assignment: SeatAssignment, error: &CoreError) -> Self {
        Self {
            passenger_id: assignment.passenger_id,
            seat_id: assignment.seat_id,
            assigned: false,
            released_seat_id: None,
            error: Some(error.to_string()),
            code: Some(error.code()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationSummary {
    pub booking: Booking,
    pub released_seats: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct BookingStats {
    pub total_bookings: i64,
    /// Confirmed bookings whose flight has not departed yet.
    pub upcoming_trips: i64,
}
