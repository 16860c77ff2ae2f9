//! Lenient reading of submitted passenger lists.
//!
//! A payload is a JSON array of passenger objects, or a string holding one.
//! Anything malformed degrades to an empty list; missing fields take
//! defaults. An empty list becomes a single passenger built from the
//! customer's own name.
//!
//! Well-formed lists are still bounded: more than [`MAX_PASSENGERS`]
//! travellers, or a field longer than its column, is a validation error
//! rather than something silently truncated.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use skyfare_core::identity::Customer;
use skyfare_core::{CoreError, CoreResult};
use tracing::warn;

use crate::models::{Gender, PassengerDetails};

/// Travellers on a single booking.
pub const MAX_PASSENGERS: usize = 9;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_PASSPORT_LEN: usize = 50;
pub const MAX_NATIONALITY_LEN: usize = 100;

pub fn default_date_of_birth() -> NaiveDate {
    NaiveDate::from_ymd_opt(1990, 1, 1).unwrap_or_default()
}

pub fn parse_passengers(payload: &Value) -> Vec<PassengerDetails> {
    match payload {
        Value::Array(entries) => entries.iter().filter_map(parse_entry).collect(),
        Value::String(raw) => parse_passengers_str(raw),
        Value::Null => Vec::new(),
        other => {
            warn!("Ignoring passenger payload of unexpected shape: {}", other);
            Vec::new()
        }
    }
}

pub fn parse_passengers_str(raw: &str) -> Vec<PassengerDetails> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) => entries.iter().filter_map(parse_entry).collect(),
        Ok(_) => {
            warn!("Passenger data is not a list, ignoring");
            Vec::new()
        }
        Err(e) => {
            warn!("Malformed passenger data, ignoring: {}", e);
            Vec::new()
        }
    }
}

fn parse_entry(entry: &Value) -> Option<PassengerDetails> {
    let Value::Object(fields) = entry else {
        warn!("Skipping passenger entry that is not an object");
        return None;
    };

    let date_of_birth = text(fields, "date_of_birth")
        .and_then(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok())
        .unwrap_or_else(default_date_of_birth);
    let gender = text(fields, "gender")
        .and_then(|raw| raw.parse::<Gender>().ok())
        .unwrap_or_default();

    Some(PassengerDetails {
        first_name: text(fields, "first_name").unwrap_or_default(),
        last_name: text(fields, "last_name").unwrap_or_default(),
        date_of_birth,
        gender,
        passport_number: text(fields, "passport_number").unwrap_or_default().into(),
        nationality: text(fields, "nationality").unwrap_or_default(),
    })
}

fn text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Stand-in traveller when the booking carries no passenger data.
pub fn placeholder(customer: &Customer) -> PassengerDetails {
    PassengerDetails {
        first_name: customer.given_name().to_string(),
        last_name: customer.family_name().to_string(),
        date_of_birth: default_date_of_birth(),
        gender: Gender::M,
        passport_number: String::new().into(),
        nationality: "Unknown".to_string(),
    }
}

/// Passengers for a new booking: the parsed payload, or the placeholder.
pub fn resolve(payload: &Value, customer: &Customer) -> Vec<PassengerDetails> {
    let passengers = parse_passengers(payload);
    if passengers.is_empty() {
        return vec![placeholder(customer)];
    }
    passengers
}

/// Checks the resolved list against the booking and column limits.
pub fn validate(passengers: &[PassengerDetails]) -> CoreResult<()> {
    if passengers.len() > MAX_PASSENGERS {
        return Err(CoreError::ValidationError(format!(
            "at most {} passengers per booking, got {}",
            MAX_PASSENGERS,
            passengers.len()
        )));
    }
    for (index, passenger) in passengers.iter().enumerate() {
        check_len(index, "first_name", &passenger.first_name, MAX_NAME_LEN)?;
        check_len(index, "last_name", &passenger.last_name, MAX_NAME_LEN)?;
        check_len(
            index,
            "passport_number",
            passenger.passport_number.expose(),
            MAX_PASSPORT_LEN,
        )?;
        check_len(index, "nationality", &passenger.nationality, MAX_NATIONALITY_LEN)?;
    }
    Ok(())
}

fn check_len(index: usize, field: &str, value: &str, max: usize) -> CoreResult<()> {
    if value.chars().count() > max {
        return Err(CoreError::ValidationError(format!(
            "passenger {}: {} is longer than {} characters",
            index + 1,
            field,
            max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_array() {
        let payload = json!([
            {
                "first_name": "Ada",
                "last_name": "Lovelace",
                "date_of_birth": "1985-12-10",
                "gender": "F",
                "passport_number": "X1234567",
                "nationality": "UK"
            },
            { "first_name": "Charles" }
        ]);

        let passengers = parse_passengers(&payload);
        assert_eq!(passengers.len(), 2);
        assert_eq!(passengers[0].gender, Gender::F);
        assert_eq!(passengers[0].passport_number.expose(), "X1234567");

        let sparse = &passengers[1];
        assert_eq!(sparse.last_name, "");
        assert_eq!(sparse.date_of_birth, default_date_of_birth());
        assert_eq!(sparse.gender, Gender::M);
        assert!(sparse.passport_number.is_empty());
    }

    #[test]
    fn test_parse_string_payload() {
        let payload = json!(r#"[{"first_name":"Grace","date_of_birth":"not-a-date","gender":"?"}]"#);
        let passengers = parse_passengers(&payload);
        assert_eq!(passengers.len(), 1);
        assert_eq!(passengers[0].first_name, "Grace");
        assert_eq!(passengers[0].date_of_birth, default_date_of_birth());
        assert_eq!(passengers[0].gender, Gender::M);
    }

    #[test]
    fn test_malformed_payload_is_empty() {
        assert!(parse_passengers_str("[{broken").is_empty());
        assert!(parse_passengers(&json!({"first_name": "Solo"})).is_empty());
        assert!(parse_passengers(&json!("")).is_empty());
        assert!(parse_passengers(&json!([1, "two"])).is_empty());
    }

    #[test]
    fn test_resolve_falls_back_to_placeholder() {
        let customer = Customer::new("user-1").with_name("Alan", "Turing");
        let passengers = resolve(&json!("not json"), &customer);

        assert_eq!(passengers.len(), 1);
        let p = &passengers[0];
        assert_eq!(p.first_name, "Alan");
        assert_eq!(p.last_name, "Turing");
        assert_eq!(p.nationality, "Unknown");
        assert_eq!(p.date_of_birth, NaiveDate::from_ymd_opt(1990, 1, 1).unwrap());

        let anonymous = resolve(&Value::Null, &Customer::new("user-2"));
        assert_eq!(anonymous[0].first_name, "Guest");
        assert_eq!(anonymous[0].last_name, "User");
    }

    #[test]
    fn test_validate_limits() {
        let customer = Customer::new("user-1").with_name("Alan", "Turing");
        let one = resolve(&Value::Null, &customer);
        assert!(validate(&one).is_ok());

        let full = vec![one[0].clone(); MAX_PASSENGERS];
        assert!(validate(&full).is_ok());

        let crowd = vec![one[0].clone(); MAX_PASSENGERS + 1];
        assert_eq!(validate(&crowd).unwrap_err().code(), "validation_error");

        // limits count characters, not bytes
        let accented = parse_passengers(&json!([{ "first_name": "é".repeat(MAX_NAME_LEN) }]));
        assert!(validate(&accented).is_ok());

        let long_name = parse_passengers(&json!([{ "last_name": "x".repeat(MAX_NAME_LEN + 1) }]));
        assert_eq!(validate(&long_name).unwrap_err().code(), "validation_error");

        let long_passport =
            parse_passengers(&json!([{ "passport_number": "9".repeat(MAX_PASSPORT_LEN + 1) }]));
        assert_eq!(validate(&long_passport).unwrap_err().code(), "validation_error");

        let long_nationality =
            parse_passengers(&json!([{ "nationality": "n".repeat(MAX_NATIONALITY_LEN + 1) }]));
        assert_eq!(validate(&long_nationality).unwrap_err().code(), "validation_error");
    }
}
