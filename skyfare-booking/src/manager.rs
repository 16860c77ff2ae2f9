use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skyfare_catalog::pricing::to_money;
use skyfare_catalog::{CatalogRepository, ClassType, FlightDetail, PricingEngine, Seat};
use skyfare_core::identity::Customer;
use skyfare_core::payment::{PaymentGateway, PaymentMethod, PaymentRequest, PaymentStatus};
use skyfare_core::{CoreError, CoreResult};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{
    payment_conflict, AssignmentOutcome, Baggage, Booking, BookingDetail, BookingStats,
    BookingStatus, CancellationSummary, Passenger, Payment, SeatAssignment,
};
use crate::passengers;
use crate::reference::BookingReference;
use crate::repository::BookingRepository;

/// Attempts at drawing an unused booking reference before giving up.
pub const DEFAULT_REFERENCE_ATTEMPTS: u32 = 5;

/// Bookings shown on the dashboard.
const RECENT_BOOKINGS: usize = 5;

/// Heaviest bag accepted, in kg (`NUMERIC(5, 2)`).
pub fn max_baggage_weight() -> Decimal {
    Decimal::new(99_999, 2)
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub seat_class_id: Uuid,
    /// Array of passenger objects, or a string holding one.
    #[serde(default)]
    pub passengers: Value,
}

#[derive(Debug, Deserialize)]
pub struct AssignSeatsRequest {
    pub assignments: Vec<SeatAssignment>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentInput {
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct BaggageRequest {
    /// kg
    pub weight: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlightLeg {
    pub flight_number: String,
    pub departure_city: String,
    pub arrival_city: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub seat_class: Option<ClassType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingSummary {
    #[serde(flatten)]
    pub booking: Booking,
    pub flight: Option<FlightLeg>,
}

#[derive(Debug, Serialize)]
pub struct SeatMap {
    pub booking_id: Uuid,
    pub flight_id: Uuid,
    pub seat_class_id: Uuid,
    pub seats: Vec<Seat>,
    /// Seats currently held by this booking's passengers.
    pub assignments: Vec<SeatAssignment>,
}

#[derive(Debug, Serialize)]
pub struct PaymentConfirmation {
    pub booking: Booking,
    pub payment: Payment,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    #[serde(flatten)]
    pub stats: BookingStats,
    pub recent_bookings: Vec<BookingSummary>,
}

/// Drives bookings through their lifecycle: creation and pricing, seat
/// assignment, payment, cancellation, baggage.
///
/// Every lookup is scoped to the acting customer; a booking owned by
/// someone else is reported as not found.
pub struct BookingManager {
    catalog: Arc<dyn CatalogRepository>,
    bookings: Arc<dyn BookingRepository>,
    gateway: Arc<dyn PaymentGateway>,
    pricing: PricingEngine,
    rng: Mutex<StdRng>,
    reference_attempts: u32,
}

impl BookingManager {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        bookings: Arc<dyn BookingRepository>,
        gateway: Arc<dyn PaymentGateway>,
        pricing: PricingEngine,
    ) -> Self {
        Self {
            catalog,
            bookings,
            gateway,
            pricing,
            rng: Mutex::new(StdRng::from_entropy()),
            reference_attempts: DEFAULT_REFERENCE_ATTEMPTS,
        }
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn with_reference_attempts(mut self, attempts: u32) -> Self {
        self.reference_attempts = attempts.max(1);
        self
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    /// Create a pending booking for `flight_id`, priced for its passengers.
    pub async fn create_booking(
        &self,
        customer: &Customer,
        flight_id: Uuid,
        request: &CreateBookingRequest,
    ) -> CoreResult<BookingDetail> {
        let flight = self.flight(flight_id).await?;
        if !flight.flight.status.is_bookable() {
            return Err(CoreError::StateConflict(format!(
                "flight {} is {}",
                flight.display_number(),
                flight.flight.status
            )));
        }
        let seat_class = flight
            .seat_class(request.seat_class_id)
            .ok_or_else(|| CoreError::not_found("SeatClass", request.seat_class_id))?;

        let details = passengers::resolve(&request.passengers, customer);
        passengers::validate(&details)?;
        let total_amount = self.pricing.booking_total(
            flight.flight.base_price,
            seat_class.price_multiplier,
            details.len(),
        )?;

        for attempt in 1..=self.reference_attempts {
            let reference = {
                let mut rng = self.rng.lock().await;
                BookingReference::generate(&mut *rng)
            };
            let booking = Booking::new(
                customer.id.clone(),
                reference,
                flight.flight.id,
                seat_class.id,
                total_amount,
            );
            let passengers: Vec<Passenger> = details
                .iter()
                .cloned()
                .map(|d| Passenger::new(booking.id, d))
                .collect();

            match self.bookings.create_booking(&booking, &passengers).await {
                Ok(()) => {
                    info!(
                        "Created booking {} on {} for {} passenger(s), total {} {}",
                        booking.booking_reference,
                        flight.display_number(),
                        passengers.len(),
                        booking.total_amount,
                        self.pricing.currency()
                    );
                    return Ok(BookingDetail {
                        booking,
                        passengers,
                        payment: None,
                        baggage: Vec::new(),
                    });
                }
                Err(CoreError::DuplicateReference(taken)) => {
                    warn!(
                        "Booking reference {} already in use (attempt {}/{})",
                        taken, attempt, self.reference_attempts
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(CoreError::InternalError(
            "could not allocate a unique booking reference".to_string(),
        ))
    }

    pub async fn get_booking(&self, customer: &Customer, booking_id: Uuid) -> CoreResult<BookingDetail> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .filter(|detail| detail.booking.user_id == customer.id)
            .ok_or_else(|| CoreError::not_found("Booking", booking_id))
    }

    pub async fn list_bookings(&self, customer: &Customer) -> CoreResult<Vec<BookingSummary>> {
        let bookings = self.bookings.list_bookings(&customer.id).await?;
        self.summarize(bookings).await
    }

    pub async fn seat_map(&self, customer: &Customer, booking_id: Uuid) -> CoreResult<SeatMap> {
        let detail = self.get_booking(customer, booking_id).await?;
        let seats = self
            .catalog
            .list_seats(detail.booking.flight_id, Some(detail.booking.seat_class_id))
            .await?;

        Ok(SeatMap {
            booking_id,
            flight_id: detail.booking.flight_id,
            seat_class_id: detail.booking.seat_class_id,
            seats,
            assignments: detail
                .passengers
                .iter()
                .filter_map(|p| {
                    p.seat_id.map(|seat_id| SeatAssignment {
                        passenger_id: p.id,
                        seat_id,
                    })
                })
                .collect(),
        })
    }

    /// Apply each (passenger, seat) pair on its own. A failed pair changes
    /// nothing; the others still go through.
    pub async fn assign_seats(
        &self,
        customer: &Customer,
        booking_id: Uuid,
        assignments: &[SeatAssignment],
    ) -> CoreResult<Vec<AssignmentOutcome>> {
        if assignments.is_empty() {
            return Err(CoreError::ValidationError(
                "no seat assignments given".to_string(),
            ));
        }
        let detail = self.get_booking(customer, booking_id).await?;
        if !detail.booking.status.is_open() {
            return Err(CoreError::StateConflict(format!(
                "booking {} is {}",
                detail.booking.booking_reference, detail.booking.status
            )));
        }

        let mut outcomes = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            match self.bookings.assign_seat(booking_id, assignment).await {
                Ok(released) => {
                    info!(
                        "Booking {}: passenger {} assigned seat {}",
                        detail.booking.booking_reference,
                        assignment.passenger_id,
                        assignment.seat_id
                    );
                    outcomes.push(AssignmentOutcome::assigned(*assignment, released));
                }
                Err(e @ (CoreError::StorageError(_) | CoreError::InternalError(_))) => return Err(e),
                Err(e) => {
                    warn!(
                        "Booking {}: seat {} not assigned: {}",
                        detail.booking.booking_reference, assignment.seat_id, e
                    );
                    outcomes.push(AssignmentOutcome::failed(*assignment, &e));
                }
            }
        }
        Ok(outcomes)
    }

    /// Charge the booking total and confirm the booking.
    ///
    /// The booking is claimed with a processing payment before the gateway
    /// is called, so concurrent attempts cannot both charge. The claim is
    /// dropped when the charge does not complete.
    pub async fn pay(
        &self,
        customer: &Customer,
        booking_id: Uuid,
        method: PaymentMethod,
    ) -> CoreResult<PaymentConfirmation> {
        let detail = self.get_booking(customer, booking_id).await?;
        let booking = &detail.booking;
        if let Some(payment) = &detail.payment {
            return Err(payment_conflict(
                &booking.booking_reference.to_string(),
                payment.status,
            ));
        }
        booking.status.transition_to(BookingStatus::Confirmed)?;

        let claim = Payment {
            id: Uuid::new_v4(),
            booking_id,
            amount: booking.total_amount,
            payment_method: method,
            transaction_id: String::new(),
            status: PaymentStatus::Processing,
            created_at: Utc::now(),
            processed_at: None,
        };
        self.bookings.begin_payment(&claim).await?;

        let request = PaymentRequest {
            booking_id,
            amount: booking.total_amount,
            currency: self.pricing.currency().to_string(),
            method,
            idempotency_key: claim.id.to_string(),
        };
        let receipt = match self.gateway.charge(&request).await {
            Ok(receipt) if receipt.status == PaymentStatus::Completed => receipt,
            Ok(receipt) => {
                warn!(
                    "Payment for booking {} came back {}",
                    booking.booking_reference, receipt.status
                );
                self.abandon_payment(booking).await;
                return Err(CoreError::PaymentFailed(format!(
                    "gateway returned {}",
                    receipt.status
                )));
            }
            Err(e) => {
                warn!("Payment for booking {} failed: {}", booking.booking_reference, e);
                self.abandon_payment(booking).await;
                return Err(e);
            }
        };

        let processed_at = receipt.processed_at.unwrap_or_else(Utc::now);
        let (confirmed, payment) = self
            .bookings
            .complete_payment(booking_id, &receipt.transaction_id, processed_at)
            .await?;
        info!(
            "Booking {} confirmed, payment {} via {}",
            confirmed.booking_reference, payment.transaction_id, method
        );

        Ok(PaymentConfirmation {
            booking: confirmed,
            payment,
        })
    }

    async fn abandon_payment(&self, booking: &Booking) {
        if let Err(e) = self.bookings.abandon_payment(booking.id).await {
            warn!(
                "Booking {}: could not drop unfinished payment: {}",
                booking.booking_reference, e
            );
        }
    }

    /// Cancel an open booking and free its seats. Payments are kept as-is.
    pub async fn cancel(&self, customer: &Customer, booking_id: Uuid) -> CoreResult<CancellationSummary> {
        let detail = self.get_booking(customer, booking_id).await?;
        let summary = self.bookings.cancel_booking(booking_id).await?;
        info!(
            "Booking {} cancelled, {} seat(s) released",
            detail.booking.booking_reference,
            summary.released_seats.len()
        );
        Ok(summary)
    }

    pub async fn add_baggage(
        &self,
        customer: &Customer,
        booking_id: Uuid,
        passenger_id: Uuid,
        weight: Decimal,
    ) -> CoreResult<Baggage> {
        if weight <= Decimal::ZERO {
            return Err(CoreError::ValidationError(
                "baggage weight must be positive".to_string(),
            ));
        }
        let weight = to_money(weight);
        if weight > max_baggage_weight() {
            return Err(CoreError::ValidationError(format!(
                "baggage weight must not exceed {} kg",
                max_baggage_weight()
            )));
        }
        let detail = self.get_booking(customer, booking_id).await?;
        if !detail.booking.status.is_open() {
            return Err(CoreError::StateConflict(format!(
                "booking {} is {}",
                detail.booking.booking_reference, detail.booking.status
            )));
        }
        if detail.passenger(passenger_id).is_none() {
            return Err(CoreError::not_found("Passenger", passenger_id));
        }

        let flight = self.flight(detail.booking.flight_id).await?;
        let allowance = flight
            .seat_class(detail.booking.seat_class_id)
            .map(|sc| sc.baggage_allowance)
            .ok_or_else(|| CoreError::not_found("SeatClass", detail.booking.seat_class_id))?;

        let baggage = Baggage {
            id: Uuid::new_v4(),
            passenger_id,
            weight,
            additional_fee: self.pricing.excess_baggage_fee(weight, allowance)?,
            created_at: Utc::now(),
        };
        self.bookings.add_baggage(booking_id, &baggage).await?;
        info!(
            "Booking {}: {} kg bag added, fee {}",
            detail.booking.booking_reference, baggage.weight, baggage.additional_fee
        );
        Ok(baggage)
    }

    pub async fn dashboard(&self, customer: &Customer, now: DateTime<Utc>) -> CoreResult<Dashboard> {
        let stats = self.bookings.booking_stats(&customer.id, now).await?;
        let mut recent = self.bookings.list_bookings(&customer.id).await?;
        recent.truncate(RECENT_BOOKINGS);

        Ok(Dashboard {
            stats,
            recent_bookings: self.summarize(recent).await?,
        })
    }

    async fn flight(&self, flight_id: Uuid) -> CoreResult<FlightDetail> {
        self.catalog
            .get_flight(flight_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Flight", flight_id))
    }

    async fn summarize(&self, bookings: Vec<Booking>) -> CoreResult<Vec<BookingSummary>> {
        let mut summaries = Vec::with_capacity(bookings.len());
        for booking in bookings {
            let flight = self
                .catalog
                .get_flight(booking.flight_id)
                .await?
                .map(|detail| FlightLeg {
                    flight_number: detail.display_number(),
                    departure_city: detail.departure_airport.city.clone(),
                    arrival_city: detail.arrival_airport.city.clone(),
                    departure_time: detail.flight.departure_time,
                    arrival_time: detail.flight.arrival_time,
                    seat_class: detail.seat_class(booking.seat_class_id).map(|sc| sc.class_type),
                });
            summaries.push(BookingSummary { booking, flight });
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::json;
    use skyfare_catalog::sample::plan_flight;
    use skyfare_catalog::{Aircraft, Airline, Airport, Flight, FlightPlan, FlightStatus};
    use skyfare_core::payment::{OfflineGateway, PaymentReceipt};
    use tokio::sync::Notify;

    struct Fixture {
        manager: Arc<BookingManager>,
        store: Arc<MemoryStore>,
        plan: FlightPlan,
        customer: Customer,
    }

    impl Fixture {
        fn class_id(&self, class_type: ClassType) -> Uuid {
            self.plan
                .seat_classes
                .iter()
                .find(|sc| sc.class_type == class_type)
                .map(|sc| sc.id)
                .unwrap()
        }

        fn seat(&self, seat_number: &str) -> Uuid {
            self.plan
                .seats
                .iter()
                .find(|s| s.seat_number == seat_number)
                .map(|s| s.id)
                .unwrap()
        }

        async fn seat_available(&self, seat_id: Uuid) -> bool {
            self.store
                .list_seats(self.plan.flight.id, None)
                .await
                .unwrap()
                .into_iter()
                .find(|s| s.id == seat_id)
                .unwrap()
                .is_available
        }

        async fn book(&self, class_type: ClassType, passengers: Value) -> BookingDetail {
            self.manager
                .create_booking(
                    &self.customer,
                    self.plan.flight.id,
                    &CreateBookingRequest {
                        seat_class_id: self.class_id(class_type),
                        passengers,
                    },
                )
                .await
                .unwrap()
        }
    }

    async fn store_with_flight(status: FlightStatus) -> (Arc<MemoryStore>, FlightPlan) {
        let store = Arc::new(MemoryStore::new());
        let airport = |code: &str, city: &str| Airport {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: format!("{} Airport", city),
            city: city.to_string(),
            country: "X".to_string(),
            timezone: "UTC".to_string(),
        };
        let (london, _) = store.get_or_create_airport(&airport("LHR", "London")).await.unwrap();
        let (dubai, _) = store.get_or_create_airport(&airport("DXB", "Dubai")).await.unwrap();
        let (airline, _) = store
            .get_or_create_airline(&Airline {
                id: Uuid::new_v4(),
                code: "EK".to_string(),
                name: "Emirates".to_string(),
            })
            .await
            .unwrap();
        let (aircraft, _) = store
            .get_or_create_aircraft(&Aircraft {
                id: Uuid::new_v4(),
                manufacturer: "Airbus".to_string(),
                model: "A380".to_string(),
                capacity: 550,
            })
            .await
            .unwrap();

        let departure_time = Utc::now() + Duration::days(7);
        let flight = Flight {
            id: Uuid::new_v4(),
            flight_number: "4021".to_string(),
            airline_id: airline.id,
            aircraft_id: aircraft.id,
            departure_airport_id: london.id,
            arrival_airport_id: dubai.id,
            departure_time,
            arrival_time: departure_time + Duration::minutes(420),
            duration_minutes: 420,
            base_price: Decimal::new(50000, 2),
            status,
            available_seats: 0,
        };
        let plan = plan_flight(flight, 100, Uuid::new_v4);
        store.insert_flight(&plan).await.unwrap();
        (store, plan)
    }

    fn manager_for(store: &Arc<MemoryStore>, seed: u64) -> BookingManager {
        BookingManager::new(
            store.clone(),
            store.clone(),
            Arc::new(OfflineGateway),
            PricingEngine::default(),
        )
        .with_rng(StdRng::seed_from_u64(seed))
    }

    async fn fixture() -> Fixture {
        let (store, plan) = store_with_flight(FlightStatus::Scheduled).await;
        Fixture {
            manager: Arc::new(manager_for(&store, 1)),
            store,
            plan,
            customer: Customer::new("user-1").with_name("Ada", "Lovelace"),
        }
    }

    fn three_passengers() -> Value {
        json!([
            { "first_name": "Ada", "last_name": "Lovelace", "passport_number": "P1" },
            { "first_name": "Charles", "last_name": "Babbage", "passport_number": "P2" },
            { "first_name": "Mary", "last_name": "Somerville", "passport_number": "P3" }
        ])
    }

    #[tokio::test]
    async fn test_create_booking_prices_every_passenger() {
        let f = fixture().await;

        let detail = f.book(ClassType::PremiumEconomy, three_passengers()).await;

        assert_eq!(detail.booking.total_amount.to_string(), "2250.00");
        assert_eq!(detail.booking.status, BookingStatus::Pending);
        assert_eq!(detail.passengers.len(), 3);

        let stored = f.manager.get_booking(&f.customer, detail.booking.id).await.unwrap();
        assert_eq!(stored.passengers.len(), 3);
        assert_eq!(stored.booking.booking_reference, detail.booking.booking_reference);
    }

    #[tokio::test]
    async fn test_empty_passenger_list_uses_customer() {
        let f = fixture().await;

        let detail = f.book(ClassType::Economy, json!("{not json")).await;

        assert_eq!(detail.passengers.len(), 1);
        assert_eq!(detail.passengers[0].full_name(), "Ada Lovelace");
        assert_eq!(detail.passengers[0].nationality, "Unknown");
        assert_eq!(detail.booking.total_amount.to_string(), "500.00");
    }

    #[tokio::test]
    async fn test_create_booking_rejections() {
        let f = fixture().await;

        let unknown_flight = f
            .manager
            .create_booking(
                &f.customer,
                Uuid::new_v4(),
                &CreateBookingRequest {
                    seat_class_id: f.class_id(ClassType::Economy),
                    passengers: Value::Null,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(unknown_flight.code(), "not_found");

        let foreign_class = f
            .manager
            .create_booking(
                &f.customer,
                f.plan.flight.id,
                &CreateBookingRequest {
                    seat_class_id: Uuid::new_v4(),
                    passengers: Value::Null,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(foreign_class.code(), "not_found");

        let (store, plan) = store_with_flight(FlightStatus::Delayed).await;
        let manager = manager_for(&store, 2);
        let delayed = manager
            .create_booking(
                &f.customer,
                plan.flight.id,
                &CreateBookingRequest {
                    seat_class_id: plan.seat_classes[0].id,
                    passengers: Value::Null,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(delayed.code(), "state_conflict");
    }

    #[tokio::test]
    async fn test_oversized_passenger_lists_are_rejected() {
        let f = fixture().await;
        let request = |passengers: Value| CreateBookingRequest {
            seat_class_id: f.class_id(ClassType::Economy),
            passengers,
        };

        let crowd: Vec<Value> = (0..=passengers::MAX_PASSENGERS)
            .map(|i| json!({ "first_name": format!("P{}", i), "last_name": "Crowd" }))
            .collect();
        let err = f
            .manager
            .create_booking(&f.customer, f.plan.flight.id, &request(Value::Array(crowd)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");

        let long_name = json!([{ "first_name": "A".repeat(5000), "last_name": "Lovelace" }]);
        let err = f
            .manager
            .create_booking(&f.customer, f.plan.flight.id, &request(long_name))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");

        assert!(f.manager.list_bookings(&f.customer).await.unwrap().is_empty());

        let full: Vec<Value> = (0..passengers::MAX_PASSENGERS)
            .map(|i| json!({ "first_name": format!("P{}", i), "last_name": "Full" }))
            .collect();
        let detail = f.book(ClassType::Economy, Value::Array(full)).await;
        assert_eq!(detail.passengers.len(), passengers::MAX_PASSENGERS);
        assert_eq!(detail.booking.total_amount.to_string(), "4500.00");
    }

    #[tokio::test]
    async fn test_reference_collision_retries() {
        let f = fixture().await;
        let first = f.book(ClassType::Economy, Value::Null).await;

        // Same seed: the first draw collides with the booking above
        let twin = manager_for(&f.store, 1);
        let second = twin
            .create_booking(
                &f.customer,
                f.plan.flight.id,
                &CreateBookingRequest {
                    seat_class_id: f.class_id(ClassType::Economy),
                    passengers: Value::Null,
                },
            )
            .await
            .unwrap();
        assert_ne!(first.booking.booking_reference, second.booking.booking_reference);

        let exhausted = manager_for(&f.store, 1).with_reference_attempts(1);
        let err = exhausted
            .create_booking(
                &f.customer,
                f.plan.flight.id,
                &CreateBookingRequest {
                    seat_class_id: f.class_id(ClassType::Economy),
                    passengers: Value::Null,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "internal_error");
    }

    #[tokio::test]
    async fn test_assign_seats_per_pair() {
        let f = fixture().await;
        let mine = f.book(ClassType::Economy, three_passengers()).await;
        let other = f.book(ClassType::Economy, Value::Null).await;

        let taken = f.seat("E1A");
        f.manager
            .assign_seats(
                &f.customer,
                other.booking.id,
                &[SeatAssignment {
                    passenger_id: other.passengers[0].id,
                    seat_id: taken,
                }],
            )
            .await
            .unwrap();

        let free = f.seat("E1B");
        let outcomes = f
            .manager
            .assign_seats(
                &f.customer,
                mine.booking.id,
                &[
                    SeatAssignment {
                        passenger_id: mine.passengers[0].id,
                        seat_id: free,
                    },
                    SeatAssignment {
                        passenger_id: mine.passengers[1].id,
                        seat_id: taken,
                    },
                    SeatAssignment {
                        passenger_id: other.passengers[0].id,
                        seat_id: f.seat("E1C"),
                    },
                ],
            )
            .await
            .unwrap();

        assert!(outcomes[0].assigned);
        assert!(!outcomes[1].assigned);
        assert_eq!(outcomes[1].code, Some("seat_unavailable"));
        // passenger from another booking
        assert_eq!(outcomes[2].code, Some("not_found"));

        let detail = f.manager.get_booking(&f.customer, mine.booking.id).await.unwrap();
        assert_eq!(detail.passengers[0].seat_id, Some(free));
        assert_eq!(detail.passengers[1].seat_id, None);
        assert!(!f.seat_available(free).await);
        assert!(f.seat_available(f.seat("E1C")).await);

        let flight = f.store.get_flight(f.plan.flight.id).await.unwrap().unwrap();
        assert_eq!(flight.flight.available_seats, 98);
        let economy = flight.seat_class(f.class_id(ClassType::Economy)).unwrap();
        assert_eq!(economy.available_seats, 68);
    }

    #[tokio::test]
    async fn test_failed_assignment_keeps_previous_seat() {
        let f = fixture().await;
        let mine = f.book(ClassType::Economy, Value::Null).await;
        let other = f.book(ClassType::Economy, Value::Null).await;
        let passenger = mine.passengers[0].id;

        f.manager
            .assign_seats(&f.customer, other.booking.id, &[SeatAssignment {
                passenger_id: other.passengers[0].id,
                seat_id: f.seat("E2A"),
            }])
            .await
            .unwrap();
        f.manager
            .assign_seats(&f.customer, mine.booking.id, &[SeatAssignment {
                passenger_id: passenger,
                seat_id: f.seat("E1A"),
            }])
            .await
            .unwrap();

        let outcomes = f
            .manager
            .assign_seats(&f.customer, mine.booking.id, &[SeatAssignment {
                passenger_id: passenger,
                seat_id: f.seat("E2A"),
            }])
            .await
            .unwrap();
        assert!(!outcomes[0].assigned);

        let detail = f.manager.get_booking(&f.customer, mine.booking.id).await.unwrap();
        assert_eq!(detail.passengers[0].seat_id, Some(f.seat("E1A")));
        assert!(!f.seat_available(f.seat("E1A")).await);
    }

    #[tokio::test]
    async fn test_reassignment_releases_old_seat() {
        let f = fixture().await;
        let mine = f.book(ClassType::Economy, Value::Null).await;
        let passenger = mine.passengers[0].id;

        for seat in ["E1A", "E3F"] {
            f.manager
                .assign_seats(&f.customer, mine.booking.id, &[SeatAssignment {
                    passenger_id: passenger,
                    seat_id: f.seat(seat),
                }])
                .await
                .unwrap();
        }

        assert!(f.seat_available(f.seat("E1A")).await);
        assert!(!f.seat_available(f.seat("E3F")).await);
        let map = f.manager.seat_map(&f.customer, mine.booking.id).await.unwrap();
        assert_eq!(map.assignments.len(), 1);
        assert_eq!(map.assignments[0].seat_id, f.seat("E3F"));
        assert_eq!(map.seats.len(), 70);
        assert_eq!(map.seats[0].seat_number, "E1A");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_one_winner() {
        let f = fixture().await;
        let contested = f.seat("B1A");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let detail = f.book(ClassType::Business, Value::Null).await;
            let manager = f.manager.clone();
            let customer = f.customer.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .assign_seats(&customer, detail.booking.id, &[SeatAssignment {
                        passenger_id: detail.passengers[0].id,
                        seat_id: contested,
                    }])
                    .await
                    .unwrap()
                    .remove(0)
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().assigned {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(!f.seat_available(contested).await);

        let mut holders = 0;
        for summary in f.manager.list_bookings(&f.customer).await.unwrap() {
            let detail = f.manager.get_booking(&f.customer, summary.booking.id).await.unwrap();
            holders += detail
                .passengers
                .iter()
                .filter(|p| p.seat_id == Some(contested))
                .count();
        }
        assert_eq!(holders, 1);
    }

    #[tokio::test]
    async fn test_payment_confirms_once() {
        let f = fixture().await;
        let detail = f.book(ClassType::Business, Value::Null).await;

        let confirmation = f
            .manager
            .pay(&f.customer, detail.booking.id, PaymentMethod::CreditCard)
            .await
            .unwrap();
        assert_eq!(confirmation.booking.status, BookingStatus::Confirmed);
        assert_eq!(confirmation.payment.amount, detail.booking.total_amount);
        assert_eq!(confirmation.payment.status, PaymentStatus::Completed);
        assert!(confirmation.payment.processed_at.is_some());

        let again = f
            .manager
            .pay(&f.customer, detail.booking.id, PaymentMethod::Paypal)
            .await
            .unwrap_err();
        assert_eq!(again.code(), "already_paid");

        // the repository enforces it too
        let direct = f
            .store
            .begin_payment(&Payment {
                id: Uuid::new_v4(),
                ..confirmation.payment.clone()
            })
            .await
            .unwrap_err();
        assert_eq!(direct.code(), "already_paid");
    }

    struct DecliningGateway;

    #[async_trait]
    impl PaymentGateway for DecliningGateway {
        async fn charge(&self, _request: &PaymentRequest) -> CoreResult<PaymentReceipt> {
            Ok(PaymentReceipt {
                transaction_id: "declined".to_string(),
                status: PaymentStatus::Failed,
                processed_at: None,
            })
        }
    }

    #[tokio::test]
    async fn test_declined_payment_records_nothing() {
        let f = fixture().await;
        let detail = f.book(ClassType::Economy, Value::Null).await;
        let manager = BookingManager::new(
            f.store.clone(),
            f.store.clone(),
            Arc::new(DecliningGateway),
            PricingEngine::default(),
        );

        let err = manager
            .pay(&f.customer, detail.booking.id, PaymentMethod::DebitCard)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "payment_failed");

        let stored = f.manager.get_booking(&f.customer, detail.booking.id).await.unwrap();
        assert_eq!(stored.booking.status, BookingStatus::Pending);
        assert!(stored.payment.is_none());
    }

    /// Holds every charge until released, recording what it was asked.
    #[derive(Default)]
    struct HeldGateway {
        entered: Notify,
        release: Notify,
        requests: std::sync::Mutex<Vec<PaymentRequest>>,
    }

    #[async_trait]
    impl PaymentGateway for HeldGateway {
        async fn charge(&self, request: &PaymentRequest) -> CoreResult<PaymentReceipt> {
            self.requests.lock().unwrap().push(request.clone());
            self.entered.notify_one();
            self.release.notified().await;
            Ok(PaymentReceipt {
                transaction_id: format!("txn-{}", request.idempotency_key),
                status: PaymentStatus::Completed,
                processed_at: Some(Utc::now()),
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_payment_in_flight_blocks_second_charge() {
        let f = fixture().await;
        let detail = f.book(ClassType::Economy, Value::Null).await;
        let gateway = Arc::new(HeldGateway::default());
        let manager = Arc::new(BookingManager::new(
            f.store.clone(),
            f.store.clone(),
            gateway.clone(),
            PricingEngine::default(),
        ));

        let first = {
            let manager = manager.clone();
            let customer = f.customer.clone();
            let booking_id = detail.booking.id;
            tokio::spawn(async move {
                manager
                    .pay(&customer, booking_id, PaymentMethod::CreditCard)
                    .await
            })
        };
        gateway.entered.notified().await;

        let second = manager
            .pay(&f.customer, detail.booking.id, PaymentMethod::Paypal)
            .await
            .unwrap_err();
        assert_eq!(second.code(), "state_conflict");
        let cancel = manager.cancel(&f.customer, detail.booking.id).await.unwrap_err();
        assert_eq!(cancel.code(), "state_conflict");

        let in_flight = f.manager.get_booking(&f.customer, detail.booking.id).await.unwrap();
        assert_eq!(in_flight.booking.status, BookingStatus::Pending);
        assert_eq!(
            in_flight.payment.map(|p| p.status),
            Some(PaymentStatus::Processing)
        );

        gateway.release.notify_one();
        let confirmation = first.await.unwrap().unwrap();
        assert_eq!(confirmation.booking.status, BookingStatus::Confirmed);

        let requests = gateway.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].idempotency_key, confirmation.payment.id.to_string());
        assert_eq!(
            confirmation.payment.transaction_id,
            format!("txn-{}", confirmation.payment.id)
        );
        assert_eq!(confirmation.payment.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_declined_payment_can_be_retried() {
        let f = fixture().await;
        let detail = f.book(ClassType::Economy, Value::Null).await;
        let declining = BookingManager::new(
            f.store.clone(),
            f.store.clone(),
            Arc::new(DecliningGateway),
            PricingEngine::default(),
        );
        declining
            .pay(&f.customer, detail.booking.id, PaymentMethod::DebitCard)
            .await
            .unwrap_err();

        let confirmation = f
            .manager
            .pay(&f.customer, detail.booking.id, PaymentMethod::DebitCard)
            .await
            .unwrap();
        assert_eq!(confirmation.booking.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_cancel_releases_seats() {
        let f = fixture().await;
        let detail = f.book(ClassType::Economy, three_passengers()).await;
        let seats = [f.seat("E5A"), f.seat("E5B")];
        let assignments: Vec<SeatAssignment> = seats
            .iter()
            .zip(&detail.passengers)
            .map(|(seat_id, p)| SeatAssignment {
                passenger_id: p.id,
                seat_id: *seat_id,
            })
            .collect();
        f.manager
            .assign_seats(&f.customer, detail.booking.id, &assignments)
            .await
            .unwrap();
        f.manager
            .pay(&f.customer, detail.booking.id, PaymentMethod::BankTransfer)
            .await
            .unwrap();

        let summary = f.manager.cancel(&f.customer, detail.booking.id).await.unwrap();
        assert_eq!(summary.booking.status, BookingStatus::Cancelled);
        assert_eq!(summary.released_seats.len(), 2);
        for seat in seats {
            assert!(f.seat_available(seat).await);
        }

        let stored = f.manager.get_booking(&f.customer, detail.booking.id).await.unwrap();
        assert!(stored.passengers.iter().all(|p| p.seat_id.is_none()));
        assert_eq!(stored.passengers.len(), 3);
        // payment stays on record
        assert!(stored.payment.is_some());

        let again = f.manager.cancel(&f.customer, detail.booking.id).await.unwrap_err();
        assert_eq!(again.code(), "invalid_transition");

        let late = f
            .manager
            .assign_seats(&f.customer, detail.booking.id, &assignments[..1])
            .await
            .unwrap_err();
        assert_eq!(late.code(), "state_conflict");
    }

    #[tokio::test]
    async fn test_other_customers_cannot_see_booking() {
        let f = fixture().await;
        let detail = f.book(ClassType::Economy, Value::Null).await;
        let stranger = Customer::new("user-2");

        let err = f.manager.get_booking(&stranger, detail.booking.id).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
        let err = f.manager.cancel(&stranger, detail.booking.id).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
        assert!(f.manager.list_bookings(&stranger).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_baggage_fee() {
        let f = fixture().await;
        let detail = f.book(ClassType::Economy, Value::Null).await;
        let passenger = detail.passengers[0].id;

        let within = f
            .manager
            .add_baggage(&f.customer, detail.booking.id, passenger, Decimal::from(20))
            .await
            .unwrap();
        assert_eq!(within.additional_fee, Decimal::ZERO);

        let heavy = f
            .manager
            .add_baggage(&f.customer, detail.booking.id, passenger, Decimal::new(255, 1))
            .await
            .unwrap();
        // 2.5 kg over the 23 kg economy allowance at 15.00/kg
        assert_eq!(heavy.additional_fee.to_string(), "37.50");

        let stored = f.manager.get_booking(&f.customer, detail.booking.id).await.unwrap();
        assert_eq!(stored.baggage.len(), 2);

        let err = f
            .manager
            .add_baggage(&f.customer, detail.booking.id, Uuid::new_v4(), Decimal::from(10))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn test_baggage_weight_is_bounded() {
        let f = fixture().await;
        let detail = f.book(ClassType::Economy, Value::Null).await;
        let passenger = detail.passengers[0].id;

        let request: BaggageRequest =
            serde_json::from_value(json!({ "weight": "79228162514264337593543950335" })).unwrap();
        assert_eq!(request.weight, Decimal::MAX);
        let err = f
            .manager
            .add_baggage(&f.customer, detail.booking.id, passenger, request.weight)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");

        // rounds up past the column limit
        let err = f
            .manager
            .add_baggage(&f.customer, detail.booking.id, passenger, Decimal::new(999_995, 3))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");

        let heaviest = f
            .manager
            .add_baggage(&f.customer, detail.booking.id, passenger, max_baggage_weight())
            .await
            .unwrap();
        // 976.99 kg over the allowance at 15.00/kg
        assert_eq!(heaviest.additional_fee.to_string(), "14654.85");

        let stored = f.manager.get_booking(&f.customer, detail.booking.id).await.unwrap();
        assert_eq!(stored.baggage.len(), 1);
    }

    #[tokio::test]
    async fn test_dashboard() {
        let f = fixture().await;
        let mut ids = Vec::new();
        for _ in 0..6 {
            ids.push(f.book(ClassType::Economy, Value::Null).await.booking.id);
        }
        f.manager
            .pay(&f.customer, ids[0], PaymentMethod::CreditCard)
            .await
            .unwrap();

        let dashboard = f.manager.dashboard(&f.customer, Utc::now()).await.unwrap();
        assert_eq!(dashboard.stats.total_bookings, 6);
        assert_eq!(dashboard.stats.upcoming_trips, 1);
        assert_eq!(dashboard.recent_bookings.len(), 5);
        let leg = dashboard.recent_bookings[0].flight.as_ref().unwrap();
        assert_eq!(leg.flight_number, "EK4021");
        assert_eq!(leg.departure_city, "London");
        assert_eq!(leg.seat_class, Some(ClassType::Economy));

        let after_departure = Utc::now() + Duration::days(30);
        let later = f.manager.dashboard(&f.customer, after_departure).await.unwrap();
        assert_eq!(later.stats.upcoming_trips, 0);
    }
}
