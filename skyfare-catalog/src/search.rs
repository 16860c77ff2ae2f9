use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use skyfare_core::{CoreError, CoreResult};
use uuid::Uuid;

use crate::models::{ClassType, FlightDetail, FlightStatus};
use crate::pricing::PricingEngine;
use crate::repository::{CatalogRepository, Destination, FlightFilter};

/// Upcoming-flights listing page size.
pub const PAGE_SIZE: i64 = 10;

/// Entries in each home page list.
pub const HOME_LIST_SIZE: i64 = 6;

/// How far ahead the home page looks for departures.
const HOME_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
pub struct FlightSearchRequest {
    pub departure_city: String,
    pub arrival_city: String,
    pub departure_date: NaiveDate,
    #[serde(default = "default_passengers")]
    pub passengers: u32,
}

fn default_passengers() -> u32 {
    1
}

#[derive(Debug, Serialize)]
pub struct FlightSearchResult {
    pub currency: String,
    pub flights: Vec<FlightOption>,
}

#[derive(Debug, Serialize)]
pub struct FlightOption {
    pub flight_id: Uuid,
    pub flight_number: String,
    pub airline: String,
    pub departure_airport: String,
    pub arrival_airport: String,
    pub departure_city: String,
    pub arrival_city: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub duration: String,
    pub aircraft: String,
    pub status: FlightStatus,
    pub base_price: Decimal,
    pub available_seats: i32,
    pub seat_classes: Vec<SeatClassOption>,
}

#[derive(Debug, Serialize)]
pub struct SeatClassOption {
    pub seat_class_id: Uuid,
    pub class_type: ClassType,
    pub label: String,
    pub price: Decimal,
    pub available_seats: i32,
    pub baggage_allowance: i32,
}

impl FlightOption {
    /// Project a flight for display. Seat classes with fewer than
    /// `min_seats` available are left out.
    pub fn from_detail(detail: &FlightDetail, pricing: &PricingEngine, min_seats: i32) -> Self {
        let flight = &detail.flight;
        let seat_classes = detail
            .seat_classes
            .iter()
            .filter(|sc| sc.available_seats >= min_seats)
            .map(|sc| SeatClassOption {
                seat_class_id: sc.id,
                class_type: sc.class_type,
                label: sc.class_type.label().to_string(),
                price: pricing.seat_class_fare(flight, sc),
                available_seats: sc.available_seats,
                baggage_allowance: sc.baggage_allowance,
            })
            .collect();

        Self {
            flight_id: flight.id,
            flight_number: detail.display_number(),
            airline: detail.airline.name.clone(),
            departure_airport: format!(
                "{} - {}",
                detail.departure_airport.code, detail.departure_airport.name
            ),
            arrival_airport: format!(
                "{} - {}",
                detail.arrival_airport.code, detail.arrival_airport.name
            ),
            departure_city: detail.departure_airport.city.clone(),
            arrival_city: detail.arrival_airport.city.clone(),
            departure_time: flight.departure_time,
            arrival_time: flight.arrival_time,
            duration: flight.duration_label(),
            aircraft: format!(
                "{} {}",
                detail.aircraft.manufacturer, detail.aircraft.model
            ),
            status: flight.status,
            base_price: flight.base_price,
            available_seats: flight.available_seats,
            seat_classes,
        }
    }
}

/// Scheduled flights between two cities on a date with room for every passenger.
pub async fn search_flights(
    repo: &dyn CatalogRepository,
    pricing: &PricingEngine,
    request: &FlightSearchRequest,
) -> CoreResult<FlightSearchResult> {
    if request.passengers == 0 {
        return Err(CoreError::ValidationError(
            "passengers must be at least 1".to_string(),
        ));
    }
    let passengers = i32::try_from(request.passengers)
        .map_err(|_| CoreError::ValidationError("too many passengers".to_string()))?;

    let filter = FlightFilter {
        departure_city: Some(request.departure_city.trim().to_string()),
        arrival_city: Some(request.arrival_city.trim().to_string()),
        departure_date: Some(request.departure_date),
        status: Some(FlightStatus::Scheduled),
        min_available: passengers,
        ..FlightFilter::default()
    };

    let flights = repo.find_flights(&filter).await?;
    tracing::debug!(
        "Search {} -> {} on {} for {} found {} flights",
        request.departure_city,
        request.arrival_city,
        request.departure_date,
        passengers,
        flights.len()
    );

    Ok(FlightSearchResult {
        currency: pricing.currency().to_string(),
        flights: flights
            .iter()
            .map(|detail| FlightOption::from_detail(detail, pricing, passengers))
            .collect(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct FlightListQuery {
    pub departure_city: Option<String>,
    pub arrival_city: Option<String>,
    /// `YYYY-MM-DD`; anything unparsable is ignored
    pub departure_date: Option<String>,
    pub page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct FlightPage {
    pub page: u32,
    pub page_size: i64,
    pub flights: Vec<FlightOption>,
}

/// Scheduled flights departing after `now`, optionally filtered, one page at a time.
pub async fn list_upcoming(
    repo: &dyn CatalogRepository,
    pricing: &PricingEngine,
    query: &FlightListQuery,
    now: DateTime<Utc>,
) -> CoreResult<FlightPage> {
    let page = query.page.unwrap_or(1).max(1);
    let departure_date = query
        .departure_date
        .as_deref()
        .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok());

    let non_empty = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let filter = FlightFilter {
        departure_city: non_empty(&query.departure_city),
        arrival_city: non_empty(&query.arrival_city),
        departure_date,
        departing_after: Some(now),
        status: Some(FlightStatus::Scheduled),
        min_available: 0,
        limit: Some(PAGE_SIZE),
        offset: (page as i64 - 1) * PAGE_SIZE,
        ..FlightFilter::default()
    };

    let flights = repo.find_flights(&filter).await?;

    Ok(FlightPage {
        page,
        page_size: PAGE_SIZE,
        flights: flights
            .iter()
            .map(|detail| FlightOption::from_detail(detail, pricing, 0))
            .collect(),
    })
}

#[derive(Debug, Serialize)]
pub struct HomePage {
    pub currency: String,
    pub popular_destinations: Vec<Destination>,
    pub upcoming_flights: Vec<FlightOption>,
}

/// Landing data: the busiest destinations and the next scheduled departures
/// within a week of `now`.
pub async fn home_page(
    repo: &dyn CatalogRepository,
    pricing: &PricingEngine,
    now: DateTime<Utc>,
) -> CoreResult<HomePage> {
    let popular_destinations = repo.popular_destinations(HOME_LIST_SIZE).await?;

    let filter = FlightFilter {
        departing_after: Some(now),
        departing_before: Some(now + Duration::days(HOME_WINDOW_DAYS)),
        status: Some(FlightStatus::Scheduled),
        limit: Some(HOME_LIST_SIZE),
        ..FlightFilter::default()
    };
    let upcoming = repo.find_flights(&filter).await?;

    Ok(HomePage {
        currency: pricing.currency().to_string(),
        popular_destinations,
        upcoming_flights: upcoming
            .iter()
            .map(|detail| FlightOption::from_detail(detail, pricing, 0))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_request_deserialization() {
        let json = r#"
            {
                "departure_city": "London",
                "arrival_city": "Dubai",
                "departure_date": "2024-12-25"
            }
        "#;
        let req: FlightSearchRequest = serde_json::from_str(json).expect("Failed to deserialize");
        assert_eq!(req.departure_city, "London");
        assert_eq!(req.departure_date, NaiveDate::from_ymd_opt(2024, 12, 25).unwrap());
        assert_eq!(req.passengers, 1);
    }
}
