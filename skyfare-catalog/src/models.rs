use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use skyfare_core::CoreError;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Airport {
    pub id: Uuid,
    /// IATA code, three characters.
    pub code: String,
    pub name: String,
    pub city: String,
    pub country: String,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Airline {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Aircraft {
    pub id: Uuid,
    pub manufacturer: String,
    pub model: String,
    pub capacity: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FlightStatus {
    Scheduled,
    Departed,
    Arrived,
    Cancelled,
    Delayed,
}

impl FlightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightStatus::Scheduled => "scheduled",
            FlightStatus::Departed => "departed",
            FlightStatus::Arrived => "arrived",
            FlightStatus::Cancelled => "cancelled",
            FlightStatus::Delayed => "delayed",
        }
    }

    /// Only scheduled flights are sold.
    pub fn is_bookable(&self) -> bool {
        *self == FlightStatus::Scheduled
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlightStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(FlightStatus::Scheduled),
            "departed" => Ok(FlightStatus::Departed),
            "arrived" => Ok(FlightStatus::Arrived),
            "cancelled" => Ok(FlightStatus::Cancelled),
            "delayed" => Ok(FlightStatus::Delayed),
            other => Err(CoreError::ValidationError(format!(
                "unknown flight status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flight {
    pub id: Uuid,
    pub flight_number: String,
    pub airline_id: Uuid,
    pub aircraft_id: Uuid,
    pub departure_airport_id: Uuid,
    pub arrival_airport_id: Uuid,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub base_price: Decimal,
    pub status: FlightStatus,
    /// Derived: seats on this flight still flagged available.
    pub available_seats: i32,
}

impl Flight {
    pub fn duration_label(&self) -> String {
        format!("{}h {:02}m", self.duration_minutes / 60, self.duration_minutes % 60)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ClassType {
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl ClassType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassType::Economy => "economy",
            ClassType::PremiumEconomy => "premium_economy",
            ClassType::Business => "business",
            ClassType::First => "first",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ClassType::Economy => "Economy",
            ClassType::PremiumEconomy => "Premium Economy",
            ClassType::Business => "Business",
            ClassType::First => "First Class",
        }
    }

    /// Prefix used in seat numbers, e.g. `P3C` for premium economy.
    pub fn seat_prefix(&self) -> char {
        match self {
            ClassType::Economy => 'E',
            ClassType::PremiumEconomy => 'P',
            ClassType::Business => 'B',
            ClassType::First => 'F',
        }
    }
}

impl fmt::Display for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "economy" => Ok(ClassType::Economy),
            "premium_economy" => Ok(ClassType::PremiumEconomy),
            "business" => Ok(ClassType::Business),
            "first" => Ok(ClassType::First),
            other => Err(CoreError::ValidationError(format!(
                "unknown seat class '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatClass {
    pub id: Uuid,
    pub flight_id: Uuid,
    pub class_type: ClassType,
    pub price_multiplier: Decimal,
    /// Derived: seats of this class still flagged available.
    pub available_seats: i32,
    /// Checked baggage allowance in kg.
    pub baggage_allowance: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Seat {
    pub id: Uuid,
    pub flight_id: Uuid,
    pub seat_class_id: Uuid,
    pub seat_number: String,
    pub is_available: bool,
    pub is_window: bool,
    pub is_aisle: bool,
}

/// A flight joined with everything a listing or booking screen needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightDetail {
    pub flight: Flight,
    pub airline: Airline,
    pub aircraft: Aircraft,
    pub departure_airport: Airport,
    pub arrival_airport: Airport,
    pub seat_classes: Vec<SeatClass>,
}

impl FlightDetail {
    /// Marketing flight number, airline code first (`BA1234`).
    pub fn display_number(&self) -> String {
        format!("{}{}", self.airline.code, self.flight.flight_number)
    }

    pub fn seat_class(&self, seat_class_id: Uuid) -> Option<&SeatClass> {
        self.seat_classes.iter().find(|sc| sc.id == seat_class_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_scheduled_flights_are_bookable() {
        assert!(FlightStatus::Scheduled.is_bookable());
        assert!(!FlightStatus::Delayed.is_bookable());
    }

    #[test]
    fn test_class_type_parsing() {
        assert_eq!(
            "premium_economy".parse::<ClassType>().unwrap(),
            ClassType::PremiumEconomy
        );
        assert!("coach".parse::<ClassType>().is_err());
        assert_eq!(ClassType::First.seat_prefix(), 'F');
    }

    #[test]
    fn test_class_type_serializes_snake_case() {
        let json = serde_json::to_string(&ClassType::PremiumEconomy).unwrap();
        assert_eq!(json, "\"premium_economy\"");
    }
}
