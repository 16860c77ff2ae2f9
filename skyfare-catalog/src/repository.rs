use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use skyfare_core::CoreResult;
use uuid::Uuid;

use crate::models::{Aircraft, Airline, Airport, Flight, FlightDetail, FlightStatus, Seat, SeatClass};

/// A flight together with its seat classes and seats, inserted as one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightPlan {
    pub flight: Flight,
    pub seat_classes: Vec<SeatClass>,
    pub seats: Vec<Seat>,
}

/// An airport with the number of flights arriving there.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Destination {
    #[serde(flatten)]
    pub airport: Airport,
    pub flight_count: i64,
}

/// Filters shared by flight search and the upcoming-flights listing.
#[derive(Debug, Clone, Default)]
pub struct FlightFilter {
    /// Case-insensitive substring of the departure airport's city
    pub departure_city: Option<String>,
    /// Case-insensitive substring of the arrival airport's city
    pub arrival_city: Option<String>,
    /// Departure date (UTC)
    pub departure_date: Option<NaiveDate>,
    pub departing_after: Option<DateTime<Utc>>,
    pub departing_before: Option<DateTime<Utc>>,
    pub status: Option<FlightStatus>,
    /// Minimum number of available seats on the flight
    pub min_available: i32,
    pub limit: Option<i64>,
    pub offset: i64,
}

/// Repository trait for catalog data access
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Returns the stored airport with the same code, inserting it first if
    /// there is none. The flag tells whether an insert happened.
    async fn get_or_create_airport(&self, airport: &Airport) -> CoreResult<(Airport, bool)>;

    async fn get_or_create_airline(&self, airline: &Airline) -> CoreResult<(Airline, bool)>;

    /// Aircraft are matched on manufacturer and model.
    async fn get_or_create_aircraft(&self, aircraft: &Aircraft) -> CoreResult<(Aircraft, bool)>;

    /// Inserts a flight with its seat classes and seats atomically.
    /// A clash on (flight_number, departure_time) is a `ConstraintViolation`.
    async fn insert_flight(&self, plan: &FlightPlan) -> CoreResult<()>;

    /// Flights matching `filter`, ordered by departure time.
    async fn find_flights(&self, filter: &FlightFilter) -> CoreResult<Vec<FlightDetail>>;

    async fn get_flight(&self, id: Uuid) -> CoreResult<Option<FlightDetail>>;

    async fn list_seats(&self, flight_id: Uuid, seat_class_id: Option<Uuid>) -> CoreResult<Vec<Seat>>;

    /// Distinct airport cities, sorted.
    async fn list_cities(&self) -> CoreResult<Vec<String>>;

    async fn count_flights(&self) -> CoreResult<i64>;

    /// Airports ranked by arriving flights, most first, ties by code.
    /// Airports nobody flies to are included with a zero count.
    async fn popular_destinations(&self, limit: i64) -> CoreResult<Vec<Destination>>;
}
