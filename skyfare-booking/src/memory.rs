//! In-process store for tests and database-less runs.
//!
//! All state sits behind one `RwLock`; every mutation runs under a single
//! write guard, which makes each call atomic with respect to the others.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skyfare_catalog::inventory::available_by_class;
use skyfare_catalog::{
    Aircraft, Airline, Airport, CatalogRepository, Destination, Flight, FlightDetail, FlightFilter,
    FlightPlan, Seat, SeatClass,
};
use skyfare_core::payment::PaymentStatus;
use skyfare_core::{CoreError, CoreResult};
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    payment_conflict, Baggage, Booking, BookingDetail, BookingStats, BookingStatus,
    CancellationSummary, Passenger, Payment, SeatAssignment,
};
use crate::repository::BookingRepository;

#[derive(Default)]
struct State {
    airports: HashMap<Uuid, Airport>,
    airlines: HashMap<Uuid, Airline>,
    aircraft: HashMap<Uuid, Aircraft>,
    flights: HashMap<Uuid, Flight>,
    seat_classes: HashMap<Uuid, SeatClass>,
    seats: HashMap<Uuid, Seat>,
    bookings: HashMap<Uuid, Booking>,
    passengers: Vec<Passenger>,
    /// Keyed by booking id; at most one payment per booking.
    payments: HashMap<Uuid, Payment>,
    baggage: Vec<Baggage>,
}

impl State {
    fn flight_detail(&self, flight: &Flight) -> Option<FlightDetail> {
        let seats: Vec<Seat> = self
            .seats
            .values()
            .filter(|s| s.flight_id == flight.id)
            .cloned()
            .collect();
        let available = available_by_class(&seats);

        let mut seat_classes: Vec<SeatClass> = self
            .seat_classes
            .values()
            .filter(|sc| sc.flight_id == flight.id)
            .map(|sc| SeatClass {
                available_seats: available.get(&sc.id).copied().unwrap_or(0),
                ..sc.clone()
            })
            .collect();
        seat_classes.sort_by_key(|sc| sc.class_type);

        let mut flight = flight.clone();
        flight.available_seats = seats.iter().filter(|s| s.is_available).count() as i32;

        Some(FlightDetail {
            airline: self.airlines.get(&flight.airline_id)?.clone(),
            aircraft: self.aircraft.get(&flight.aircraft_id)?.clone(),
            departure_airport: self.airports.get(&flight.departure_airport_id)?.clone(),
            arrival_airport: self.airports.get(&flight.arrival_airport_id)?.clone(),
            flight,
            seat_classes,
        })
    }

    fn booking_mut(&mut self, booking_id: Uuid) -> CoreResult<&mut Booking> {
        self.bookings
            .get_mut(&booking_id)
            .ok_or_else(|| CoreError::not_found("Booking", booking_id))
    }

    fn release_seat(&mut self, seat_id: Uuid) {
        if let Some(seat) = self.seats.get_mut(&seat_id) {
            seat.is_available = true;
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Natural seat order within a class: `E2A` before `E10A`.
fn seat_order(seat: &Seat) -> (usize, String) {
    (seat.seat_number.len(), seat.seat_number.clone())
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn get_or_create_airport(&self, airport: &Airport) -> CoreResult<(Airport, bool)> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if let Some(existing) = state.airports.values().find(|a| a.code == airport.code) {
            return Ok((existing.clone(), false));
        }
        state.airports.insert(airport.id, airport.clone());
        Ok((airport.clone(), true))
    }

    async fn get_or_create_airline(&self, airline: &Airline) -> CoreResult<(Airline, bool)> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if let Some(existing) = state.airlines.values().find(|a| a.code == airline.code) {
            return Ok((existing.clone(), false));
        }
        state.airlines.insert(airline.id, airline.clone());
        Ok((airline.clone(), true))
    }

    async fn get_or_create_aircraft(&self, aircraft: &Aircraft) -> CoreResult<(Aircraft, bool)> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if let Some(existing) = state
            .aircraft
            .values()
            .find(|a| a.manufacturer == aircraft.manufacturer && a.model == aircraft.model)
        {
            return Ok((existing.clone(), false));
        }
        state.aircraft.insert(aircraft.id, aircraft.clone());
        Ok((aircraft.clone(), true))
    }

    async fn insert_flight(&self, plan: &FlightPlan) -> CoreResult<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let flight = &plan.flight;

        if state.flights.values().any(|f| {
            f.flight_number == flight.flight_number && f.departure_time == flight.departure_time
        }) {
            return Err(CoreError::ConstraintViolation(format!(
                "flight {} departing {} already exists",
                flight.flight_number, flight.departure_time
            )));
        }
        if !state.airlines.contains_key(&flight.airline_id)
            || !state.aircraft.contains_key(&flight.aircraft_id)
            || !state.airports.contains_key(&flight.departure_airport_id)
            || !state.airports.contains_key(&flight.arrival_airport_id)
        {
            return Err(CoreError::ConstraintViolation(format!(
                "flight {} references unknown reference data",
                flight.flight_number
            )));
        }

        let mut class_types = HashSet::new();
        let class_ids: HashSet<Uuid> = plan.seat_classes.iter().map(|sc| sc.id).collect();
        for seat_class in &plan.seat_classes {
            if seat_class.flight_id != flight.id || !class_types.insert(seat_class.class_type) {
                return Err(CoreError::ConstraintViolation(format!(
                    "seat class {} is duplicated or on another flight",
                    seat_class.class_type
                )));
            }
        }
        let mut numbers = HashSet::new();
        for seat in &plan.seats {
            if seat.flight_id != flight.id
                || !class_ids.contains(&seat.seat_class_id)
                || !numbers.insert(seat.seat_number.as_str())
            {
                return Err(CoreError::ConstraintViolation(format!(
                    "seat {} is duplicated or misplaced",
                    seat.seat_number
                )));
            }
        }

        state.flights.insert(flight.id, flight.clone());
        for seat_class in &plan.seat_classes {
            state.seat_classes.insert(seat_class.id, seat_class.clone());
        }
        for seat in &plan.seats {
            state.seats.insert(seat.id, seat.clone());
        }
        Ok(())
    }

    async fn find_flights(&self, filter: &FlightFilter) -> CoreResult<Vec<FlightDetail>> {
        let state = self.state.read().await;

        let mut matches: Vec<FlightDetail> = state
            .flights
            .values()
            .filter(|f| filter.status.map_or(true, |status| f.status == status))
            .filter(|f| {
                filter
                    .departure_date
                    .map_or(true, |date| f.departure_time.date_naive() == date)
            })
            .filter(|f| filter.departing_after.map_or(true, |after| f.departure_time > after))
            .filter(|f| filter.departing_before.map_or(true, |before| f.departure_time <= before))
            .filter_map(|f| state.flight_detail(f))
            .filter(|d| {
                filter.departure_city.as_deref().map_or(true, |city| {
                    contains_ignore_case(&d.departure_airport.city, city)
                })
            })
            .filter(|d| {
                filter.arrival_city.as_deref().map_or(true, |city| {
                    contains_ignore_case(&d.arrival_airport.city, city)
                })
            })
            .filter(|d| d.flight.available_seats >= filter.min_available)
            .collect();

        matches.sort_by(|a, b| {
            a.flight
                .departure_time
                .cmp(&b.flight.departure_time)
                .then_with(|| a.flight.flight_number.cmp(&b.flight.flight_number))
        });

        let offset = filter.offset.max(0) as usize;
        let limit = filter.limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(matches.into_iter().skip(offset).take(limit).collect())
    }

    async fn get_flight(&self, id: Uuid) -> CoreResult<Option<FlightDetail>> {
        let state = self.state.read().await;
        Ok(state.flights.get(&id).and_then(|f| state.flight_detail(f)))
    }

    async fn list_seats(&self, flight_id: Uuid, seat_class_id: Option<Uuid>) -> CoreResult<Vec<Seat>> {
        let state = self.state.read().await;
        let mut seats: Vec<Seat> = state
            .seats
            .values()
            .filter(|s| s.flight_id == flight_id)
            .filter(|s| seat_class_id.map_or(true, |id| s.seat_class_id == id))
            .cloned()
            .collect();
        seats.sort_by_key(seat_order);
        Ok(seats)
    }

    async fn list_cities(&self) -> CoreResult<Vec<String>> {
        let state = self.state.read().await;
        let cities: BTreeSet<String> = state.airports.values().map(|a| a.city.clone()).collect();
        Ok(cities.into_iter().collect())
    }

    async fn count_flights(&self) -> CoreResult<i64> {
        Ok(self.state.read().await.flights.len() as i64)
    }

    async fn popular_destinations(&self, limit: i64) -> CoreResult<Vec<Destination>> {
        let state = self.state.read().await;

        let mut arrivals: HashMap<Uuid, i64> = HashMap::new();
        for flight in state.flights.values() {
            *arrivals.entry(flight.arrival_airport_id).or_default() += 1;
        }

        let mut destinations: Vec<Destination> = state
            .airports
            .values()
            .map(|airport| Destination {
                airport: airport.clone(),
                flight_count: arrivals.get(&airport.id).copied().unwrap_or(0),
            })
            .collect();
        destinations.sort_by(|a, b| {
            b.flight_count
                .cmp(&a.flight_count)
                .then_with(|| a.airport.code.cmp(&b.airport.code))
        });
        destinations.truncate(limit.max(0) as usize);
        Ok(destinations)
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn create_booking(&self, booking: &Booking, passengers: &[Passenger]) -> CoreResult<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if state
            .bookings
            .values()
            .any(|b| b.booking_reference == booking.booking_reference)
        {
            return Err(CoreError::DuplicateReference(
                booking.booking_reference.to_string(),
            ));
        }
        if state.bookings.contains_key(&booking.id) {
            return Err(CoreError::ConstraintViolation(format!(
                "booking {} already exists",
                booking.id
            )));
        }
        if !state.flights.contains_key(&booking.flight_id)
            || !state.seat_classes.contains_key(&booking.seat_class_id)
        {
            return Err(CoreError::ConstraintViolation(
                "booking references an unknown flight or seat class".to_string(),
            ));
        }

        state.bookings.insert(booking.id, booking.clone());
        state.passengers.extend(passengers.iter().cloned());
        Ok(())
    }

    async fn get_booking(&self, booking_id: Uuid) -> CoreResult<Option<BookingDetail>> {
        let state = self.state.read().await;
        let Some(booking) = state.bookings.get(&booking_id) else {
            return Ok(None);
        };

        let passengers: Vec<Passenger> = state
            .passengers
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect();
        let passenger_ids: HashSet<Uuid> = passengers.iter().map(|p| p.id).collect();
        let baggage = state
            .baggage
            .iter()
            .filter(|b| passenger_ids.contains(&b.passenger_id))
            .cloned()
            .collect();

        Ok(Some(BookingDetail {
            booking: booking.clone(),
            passengers,
            payment: state.payments.get(&booking_id).cloned(),
            baggage,
        }))
    }

    async fn list_bookings(&self, user_id: &str) -> CoreResult<Vec<Booking>> {
        let state = self.state.read().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn assign_seat(
        &self,
        booking_id: Uuid,
        assignment: &SeatAssignment,
    ) -> CoreResult<Option<Uuid>> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let booking = state.booking_mut(booking_id)?;
        if !booking.status.is_open() {
            return Err(CoreError::StateConflict(format!(
                "booking {} is {}",
                booking.booking_reference, booking.status
            )));
        }
        let flight_id = booking.flight_id;

        let passenger_index = state
            .passengers
            .iter()
            .position(|p| p.id == assignment.passenger_id && p.booking_id == booking_id)
            .ok_or_else(|| CoreError::not_found("Passenger", assignment.passenger_id))?;

        let seat = state
            .seats
            .get_mut(&assignment.seat_id)
            .filter(|s| s.flight_id == flight_id)
            .ok_or_else(|| CoreError::not_found("Seat", assignment.seat_id))?;

        let previous = state.passengers[passenger_index].seat_id;
        if previous == Some(seat.id) {
            return Ok(None);
        }
        if !seat.is_available {
            return Err(CoreError::SeatUnavailable(seat.seat_number.clone()));
        }
        seat.is_available = false;

        if let Some(old_seat) = previous {
            state.release_seat(old_seat);
        }
        state.passengers[passenger_index].seat_id = Some(assignment.seat_id);
        Ok(previous)
    }

    async fn begin_payment(&self, payment: &Payment) -> CoreResult<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let booking = state.booking_mut(payment.booking_id)?;
        let reference = booking.booking_reference.to_string();
        let status = booking.status;
        if let Some(existing) = state.payments.get(&payment.booking_id) {
            return Err(payment_conflict(&reference, existing.status));
        }
        status.transition_to(BookingStatus::Confirmed)?;

        state.payments.insert(
            payment.booking_id,
            Payment {
                status: PaymentStatus::Processing,
                processed_at: None,
                ..payment.clone()
            },
        );
        Ok(())
    }

    async fn complete_payment(
        &self,
        booking_id: Uuid,
        transaction_id: &str,
        processed_at: DateTime<Utc>,
    ) -> CoreResult<(Booking, Payment)> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let reference = state.booking_mut(booking_id)?.booking_reference.to_string();
        if !state
            .payments
            .get(&booking_id)
            .is_some_and(|p| p.status == PaymentStatus::Processing)
        {
            return Err(CoreError::StateConflict(format!(
                "no payment in progress for booking {}",
                reference
            )));
        }

        let booking = state.booking_mut(booking_id)?;
        booking.update_status(BookingStatus::Confirmed)?;
        let confirmed = booking.clone();

        let payment = state
            .payments
            .get_mut(&booking_id)
            .ok_or_else(|| CoreError::not_found("Payment", booking_id))?;
        payment.status = PaymentStatus::Completed;
        payment.transaction_id = transaction_id.to_string();
        payment.processed_at = Some(processed_at);

        Ok((confirmed, payment.clone()))
    }

    async fn abandon_payment(&self, booking_id: Uuid) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if state
            .payments
            .get(&booking_id)
            .is_some_and(|p| p.status == PaymentStatus::Processing)
        {
            state.payments.remove(&booking_id);
        }
        Ok(())
    }

    async fn cancel_booking(&self, booking_id: Uuid) -> CoreResult<CancellationSummary> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let reference = state.booking_mut(booking_id)?.booking_reference.to_string();
        if state
            .payments
            .get(&booking_id)
            .is_some_and(|p| p.status == PaymentStatus::Processing)
        {
            return Err(payment_conflict(&reference, PaymentStatus::Processing));
        }

        let booking = state.booking_mut(booking_id)?;
        booking.update_status(BookingStatus::Cancelled)?;
        let cancelled = booking.clone();

        let mut released_seats = Vec::new();
        for passenger in state
            .passengers
            .iter_mut()
            .filter(|p| p.booking_id == booking_id)
        {
            if let Some(seat_id) = passenger.seat_id.take() {
                released_seats.push(seat_id);
            }
        }
        for seat_id in &released_seats {
            state.release_seat(*seat_id);
        }

        Ok(CancellationSummary {
            booking: cancelled,
            released_seats,
        })
    }

    async fn add_baggage(&self, booking_id: Uuid, baggage: &Baggage) -> CoreResult<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let booking = state.booking_mut(booking_id)?;
        if !booking.status.is_open() {
            return Err(CoreError::StateConflict(format!(
                "booking {} is {}",
                booking.booking_reference, booking.status
            )));
        }
        if !state
            .passengers
            .iter()
            .any(|p| p.id == baggage.passenger_id && p.booking_id == booking_id)
        {
            return Err(CoreError::not_found("Passenger", baggage.passenger_id));
        }

        state.baggage.push(baggage.clone());
        Ok(())
    }

    async fn booking_stats(&self, user_id: &str, now: DateTime<Utc>) -> CoreResult<BookingStats> {
        let state = self.state.read().await;
        let mut stats = BookingStats::default();

        for booking in state.bookings.values().filter(|b| b.user_id == user_id) {
            stats.total_bookings += 1;
            let upcoming = booking.status == BookingStatus::Confirmed
                && state
                    .flights
                    .get(&booking.flight_id)
                    .is_some_and(|f| f.departure_time > now);
            if upcoming {
                stats.upcoming_trips += 1;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use skyfare_catalog::sample::{seed_catalog, SampleConfig, SampleGenerator};
    use skyfare_catalog::FlightStatus;

    fn generator(seed: u64, days: u32) -> SampleGenerator<StdRng> {
        SampleGenerator::new(
            StdRng::seed_from_u64(seed),
            SampleConfig {
                days,
                ..SampleConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_reseeding_adds_flights_only() {
        let store = MemoryStore::new();
        let start = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let first = seed_catalog(&store, &mut generator(1, 3), start).await.unwrap();
        assert_eq!(first.airports_created, 8);
        assert_eq!(first.airlines_created, 8);
        assert_eq!(first.aircraft_created, 5);
        assert!(first.flights_created >= 15);

        let second = seed_catalog(&store, &mut generator(2, 3), start).await.unwrap();
        assert_eq!(second.airports_created, 0);
        assert_eq!(second.airlines_created, 0);
        assert_eq!(second.aircraft_created, 0);
        assert_eq!(
            second.total_flights,
            (first.flights_created + second.flights_created) as i64
        );
        assert!(second.total_flights > first.total_flights);
        assert_eq!(store.list_cities().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_duplicate_flight_is_skipped() {
        let store = MemoryStore::new();
        let start = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        seed_catalog(&store, &mut generator(5, 2), start).await.unwrap();
        // Same seed replays the same flight numbers and times
        let replay = seed_catalog(&store, &mut generator(5, 2), start).await.unwrap();

        assert_eq!(replay.flights_created, 0);
        assert!(replay.flights_skipped > 0);
    }

    #[tokio::test]
    async fn test_find_flights_filters() {
        let store = MemoryStore::new();
        let start = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        seed_catalog(&store, &mut generator(9, 5), start).await.unwrap();

        let all = store.find_flights(&FlightFilter::default()).await.unwrap();
        assert!(all
            .windows(2)
            .all(|w| w[0].flight.departure_time <= w[1].flight.departure_time));

        let london = store
            .find_flights(&FlightFilter {
                departure_city: Some("lond".to_string()),
                status: Some(FlightStatus::Scheduled),
                ..FlightFilter::default()
            })
            .await
            .unwrap();
        assert!(london.iter().all(|d| d.departure_airport.city == "London"));

        let day = start + chrono::Duration::days(2);
        let on_day = store
            .find_flights(&FlightFilter {
                departure_date: Some(day),
                ..FlightFilter::default()
            })
            .await
            .unwrap();
        assert!(!on_day.is_empty());
        assert!(on_day.iter().all(|d| d.flight.departure_time.date_naive() == day));

        let page = store
            .find_flights(&FlightFilter {
                limit: Some(10),
                offset: 10,
                ..FlightFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(page[0].flight.id, all[10].flight.id);

        let too_full = store
            .find_flights(&FlightFilter {
                min_available: 1_000,
                ..FlightFilter::default()
            })
            .await
            .unwrap();
        assert!(too_full.is_empty());

        let detail = &all[0];
        let total: i32 = detail.seat_classes.iter().map(|sc| sc.available_seats).sum();
        assert_eq!(total, detail.flight.available_seats);
    }

    #[tokio::test]
    async fn test_departure_window_and_destinations() {
        let store = MemoryStore::new();
        let start = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        seed_catalog(&store, &mut generator(4, 10), start).await.unwrap();
        let all = store.find_flights(&FlightFilter::default()).await.unwrap();

        let after = all[0].flight.departure_time;
        let before = after + chrono::Duration::days(3);
        let window = store
            .find_flights(&FlightFilter {
                departing_after: Some(after),
                departing_before: Some(before),
                ..FlightFilter::default()
            })
            .await
            .unwrap();
        assert!(!window.is_empty());
        assert!(window.len() < all.len());
        assert!(window
            .iter()
            .all(|d| d.flight.departure_time > after && d.flight.departure_time <= before));

        let everything = store.popular_destinations(100).await.unwrap();
        let total: i64 = everything.iter().map(|d| d.flight_count).sum();
        assert_eq!(total, all.len() as i64);
        assert_eq!(everything.len(), store.state.read().await.airports.len());
        assert!(everything.windows(2).all(|w| {
            w[0].flight_count > w[1].flight_count
                || (w[0].flight_count == w[1].flight_count && w[0].airport.code < w[1].airport.code)
        }));

        let top = store.popular_destinations(3).await.unwrap();
        assert_eq!(top, everything[..3].to_vec());
    }
}
