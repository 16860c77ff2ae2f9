use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use skyfare_core::{CoreError, CoreResult};

use crate::models::{Flight, SeatClass};

/// Money is carried with two decimal places.
pub const MONEY_SCALE: u32 = 2;

/// Largest amount a stored money column holds (`NUMERIC(10, 2)`).
pub fn max_amount() -> Decimal {
    Decimal::new(9_999_999_999, MONEY_SCALE)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// ISO currency code reported alongside every amount
    pub currency: String,

    /// Charge per kg above the seat class baggage allowance
    pub excess_baggage_fee_per_kg: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            excess_baggage_fee_per_kg: Decimal::new(1500, 2),
        }
    }
}

/// Fare calculation for seat classes and bookings.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn currency(&self) -> &str {
        &self.config.currency
    }

    /// Per-passenger fare: `base_price × price_multiplier`.
    pub fn fare(&self, base_price: Decimal, price_multiplier: Decimal) -> Decimal {
        to_money(base_price * price_multiplier)
    }

    pub fn seat_class_fare(&self, flight: &Flight, seat_class: &SeatClass) -> Decimal {
        self.fare(flight.base_price, seat_class.price_multiplier)
    }

    /// Booking total: `base_price × price_multiplier × max(1, passengers)`.
    /// Totals that overflow or do not fit a money column are rejected.
    pub fn booking_total(
        &self,
        base_price: Decimal,
        price_multiplier: Decimal,
        passengers: usize,
    ) -> CoreResult<Decimal> {
        let count = Decimal::from(passengers.max(1) as u64);
        let total = base_price
            .checked_mul(price_multiplier)
            .and_then(|fare| fare.checked_mul(count));
        bounded_amount(total, "booking total")
    }

    /// Fee for a checked bag: every kg above the allowance is charged.
    pub fn excess_baggage_fee(&self, weight_kg: Decimal, allowance_kg: i32) -> CoreResult<Decimal> {
        let excess = weight_kg
            .checked_sub(Decimal::from(allowance_kg))
            .ok_or_else(|| CoreError::ValidationError("baggage weight out of range".to_string()))?;
        if excess <= Decimal::ZERO {
            return Ok(to_money(Decimal::ZERO));
        }
        bounded_amount(
            excess.checked_mul(self.config.excess_baggage_fee_per_kg),
            "baggage fee",
        )
    }
}

fn bounded_amount(amount: Option<Decimal>, what: &str) -> CoreResult<Decimal> {
    match amount.map(to_money) {
        Some(amount) if amount <= max_amount() => Ok(amount),
        _ => Err(CoreError::ValidationError(format!(
            "{} exceeds {}",
            what,
            max_amount()
        ))),
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}

/// Round half away from zero to cents and pin the scale, so `500 × 1.0`
/// reads back as `500.00`.
pub fn to_money(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}
