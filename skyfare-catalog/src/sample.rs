//! Demo catalog generation.
//!
//! Reference data (airports, airlines, aircraft) is fixed and stored with
//! get-or-create, so re-running never duplicates it. Flights are random and
//! always inserted fresh: every run adds another batch.

use chrono::{Duration, NaiveDate, NaiveTime};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use skyfare_core::{CoreError, CoreResult};
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::inventory::{class_allocation, SeatPosition};
use crate::models::{Aircraft, Airline, Airport, ClassType, Flight, FlightStatus, Seat, SeatClass};
use crate::repository::{CatalogRepository, FlightPlan};

const AIRPORTS: [(&str, &str, &str, &str, &str); 8] = [
    ("NYC", "John F. Kennedy International Airport", "New York", "USA", "America/New_York"),
    ("LAX", "Los Angeles International Airport", "Los Angeles", "USA", "America/Los_Angeles"),
    ("LHR", "London Heathrow Airport", "London", "UK", "Europe/London"),
    ("DXB", "Dubai International Airport", "Dubai", "UAE", "Asia/Dubai"),
    ("BOM", "Chhatrapati Shivaji International Airport", "Mumbai", "India", "Asia/Kolkata"),
    ("SYD", "Kingsford Smith Airport", "Sydney", "Australia", "Australia/Sydney"),
    ("NRT", "Narita International Airport", "Tokyo", "Japan", "Asia/Tokyo"),
    ("CDG", "Charles de Gaulle Airport", "Paris", "France", "Europe/Paris"),
];

const AIRLINES: [(&str, &str); 8] = [
    ("AA", "American Airlines"),
    ("UA", "United Airlines"),
    ("DL", "Delta Airlines"),
    ("BA", "British Airways"),
    ("EK", "Emirates"),
    ("AI", "Air India"),
    ("QF", "Qantas"),
    ("AF", "Air France"),
];

const AIRCRAFT: [(&str, &str, i32); 5] = [
    ("Boeing", "737-800", 180),
    ("Boeing", "777-300ER", 350),
    ("Airbus", "A320", 180),
    ("Airbus", "A380", 550),
    ("Boeing", "787-9", 290),
];

const DEPARTURE_MINUTES: [i64; 4] = [0, 15, 30, 45];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleConfig {
    pub days: u32,
    pub min_flights_per_day: u32,
    pub max_flights_per_day: u32,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            days: 30,
            min_flights_per_day: 5,
            max_flights_per_day: 15,
        }
    }
}

/// Price multiplier and baggage allowance (kg) for each class.
pub fn class_terms(class_type: ClassType) -> (Decimal, i32) {
    match class_type {
        ClassType::Economy => (Decimal::new(100, 2), 23),
        ClassType::PremiumEconomy => (Decimal::new(150, 2), 32),
        ClassType::Business => (Decimal::new(300, 2), 32),
        ClassType::First => (Decimal::new(500, 2), 32),
    }
}

/// Lay out seat classes and seats for `flight` from a pool of `pool` seats.
/// `available_seats` on the flight is set to the number of seats created.
pub fn plan_flight(mut flight: Flight, pool: i32, mut next_id: impl FnMut() -> Uuid) -> FlightPlan {
    let mut seat_classes = Vec::new();
    let mut seats = Vec::new();

    for (class_type, count) in class_allocation(pool) {
        let (price_multiplier, baggage_allowance) = class_terms(class_type);
        let seat_class = SeatClass {
            id: next_id(),
            flight_id: flight.id,
            class_type,
            price_multiplier,
            available_seats: count,
            baggage_allowance,
        };

        for index in 0..count as usize {
            let position = SeatPosition::at(index);
            seats.push(Seat {
                id: next_id(),
                flight_id: flight.id,
                seat_class_id: seat_class.id,
                seat_number: position.seat_number(class_type),
                is_available: true,
                is_window: position.is_window(),
                is_aisle: position.is_aisle(),
            });
        }
        seat_classes.push(seat_class);
    }

    flight.available_seats = seats.len() as i32;
    FlightPlan {
        flight,
        seat_classes,
        seats,
    }
}

/// Randomized catalog content from an explicit random source.
pub struct SampleGenerator<R> {
    rng: R,
    config: SampleConfig,
}

impl<R: Rng> SampleGenerator<R> {
    pub fn new(rng: R, config: SampleConfig) -> Self {
        Self { rng, config }
    }

    fn next_id(&mut self) -> Uuid {
        uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid()
    }

    pub fn reference_airports(&mut self) -> Vec<Airport> {
        AIRPORTS
            .iter()
            .map(|(code, name, city, country, timezone)| Airport {
                id: self.next_id(),
                code: code.to_string(),
                name: name.to_string(),
                city: city.to_string(),
                country: country.to_string(),
                timezone: timezone.to_string(),
            })
            .collect()
    }

    pub fn reference_airlines(&mut self) -> Vec<Airline> {
        AIRLINES
            .iter()
            .map(|(code, name)| Airline {
                id: self.next_id(),
                code: code.to_string(),
                name: name.to_string(),
            })
            .collect()
    }

    pub fn reference_aircraft(&mut self) -> Vec<Aircraft> {
        AIRCRAFT
            .iter()
            .map(|(manufacturer, model, capacity)| Aircraft {
                id: self.next_id(),
                manufacturer: manufacturer.to_string(),
                model: model.to_string(),
                capacity: *capacity,
            })
            .collect()
    }

    /// Flights for `config.days` consecutive days starting at `start`.
    pub fn generate_flights(
        &mut self,
        start: NaiveDate,
        airports: &[Airport],
        airlines: &[Airline],
        aircraft: &[Aircraft],
    ) -> CoreResult<Vec<FlightPlan>> {
        if airports.len() < 2 || airlines.is_empty() || aircraft.is_empty() {
            return Err(CoreError::ValidationError(
                "sample data needs two airports, an airline and an aircraft".to_string(),
            ));
        }
        if self.config.min_flights_per_day > self.config.max_flights_per_day {
            return Err(CoreError::ValidationError(
                "min_flights_per_day exceeds max_flights_per_day".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut plans = Vec::new();

        for day in 0..self.config.days {
            let date = start + Duration::days(day as i64);
            let count = self
                .rng
                .gen_range(self.config.min_flights_per_day..=self.config.max_flights_per_day);

            for _ in 0..count {
                plans.push(self.generate_flight(date, airports, airlines, aircraft, &mut seen));
            }
        }

        Ok(plans)
    }

    fn generate_flight(
        &mut self,
        date: NaiveDate,
        airports: &[Airport],
        airlines: &[Airline],
        aircraft: &[Aircraft],
        seen: &mut HashSet<(String, chrono::DateTime<chrono::Utc>)>,
    ) -> FlightPlan {
        let departure_index = self.rng.gen_range(0..airports.len());
        let mut arrival_index = self.rng.gen_range(0..airports.len() - 1);
        if arrival_index >= departure_index {
            arrival_index += 1;
        }

        let hour = self.rng.gen_range(6..=22);
        let minute = DEPARTURE_MINUTES[self.rng.gen_range(0..DEPARTURE_MINUTES.len())];
        let departure_time =
            (date.and_time(NaiveTime::MIN) + Duration::minutes(hour * 60 + minute)).and_utc();

        let duration_minutes = self.rng.gen_range(2..=12) * 60 + self.rng.gen_range(0..=59);
        let arrival_time = departure_time + Duration::minutes(duration_minutes as i64);

        // (flight_number, departure_time) must stay unique within the batch
        let flight_number = loop {
            let candidate = self.rng.gen_range(100..=9999).to_string();
            if seen.insert((candidate.clone(), departure_time)) {
                break candidate;
            }
        };

        let airline = &airlines[self.rng.gen_range(0..airlines.len())];
        let plane = &aircraft[self.rng.gen_range(0..aircraft.len())];
        let base_price = Decimal::from(self.rng.gen_range(200..=1500));
        let pool = self.rng.gen_range(50..=200);

        let flight = Flight {
            id: self.next_id(),
            flight_number,
            airline_id: airline.id,
            aircraft_id: plane.id,
            departure_airport_id: airports[departure_index].id,
            arrival_airport_id: airports[arrival_index].id,
            departure_time,
            arrival_time,
            duration_minutes,
            base_price,
            status: FlightStatus::Scheduled,
            available_seats: 0,
        };

        plan_flight(flight, pool, || self.next_id())
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SeedReport {
    pub airports_created: usize,
    pub airlines_created: usize,
    pub aircraft_created: usize,
    pub flights_created: usize,
    pub flights_skipped: usize,
    pub seats_created: usize,
    pub total_flights: i64,
}

/// Store reference data (get-or-create) and a fresh batch of flights.
pub async fn seed_catalog<R: Rng + Send>(
    repo: &dyn CatalogRepository,
    generator: &mut SampleGenerator<R>,
    start: NaiveDate,
) -> CoreResult<SeedReport> {
    let mut report = SeedReport::default();

    let mut airports = Vec::new();
    for airport in generator.reference_airports() {
        let (stored, created) = repo.get_or_create_airport(&airport).await?;
        if created {
            info!("Created airport: {}", stored.code);
            report.airports_created += 1;
        }
        airports.push(stored);
    }

    let mut airlines = Vec::new();
    for airline in generator.reference_airlines() {
        let (stored, created) = repo.get_or_create_airline(&airline).await?;
        if created {
            info!("Created airline: {}", stored.code);
            report.airlines_created += 1;
        }
        airlines.push(stored);
    }

    let mut fleet = Vec::new();
    for aircraft in generator.reference_aircraft() {
        let (stored, created) = repo.get_or_create_aircraft(&aircraft).await?;
        if created {
            info!("Created aircraft: {} {}", stored.manufacturer, stored.model);
            report.aircraft_created += 1;
        }
        fleet.push(stored);
    }

    let plans = generator.generate_flights(start, &airports, &airlines, &fleet)?;
    for plan in &plans {
        match repo.insert_flight(plan).await {
            Ok(()) => {
                report.flights_created += 1;
                report.seats_created += plan.seats.len();
            }
            Err(CoreError::ConstraintViolation(reason)) => {
                warn!(
                    "Skipping flight {} at {}: {}",
                    plan.flight.flight_number, plan.flight.departure_time, reason
                );
                report.flights_skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    report.total_flights = repo.count_flights().await?;
    info!(
        "Successfully created sample data with {} flights ({} new, {} seats)",
        report.total_flights, report.flights_created, report.seats_created
    );

    Ok(report)
}
