use rust_decimal::Decimal;
use serde_json::Value;
use skyfare_core::CoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::app_config::{BusinessRules, DatabaseConfig};

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay `business_rules` rows on the configured defaults.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<(String, Value)> =
            sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
                .fetch_all(&self.pool)
                .await?;

        Ok(apply_rule_overrides(defaults, rows))
    }
}

/// Rows look like `{"value": <number|string>}`. Unknown keys and values of
/// the wrong type are skipped.
pub fn apply_rule_overrides(defaults: BusinessRules, rows: Vec<(String, Value)>) -> BusinessRules {
    let mut rules = defaults;

    for (key, raw) in rows {
        let Some(v) = raw.get("value") else {
            warn!("Business rule {} has no value, ignoring", key);
            continue;
        };
        match key.as_str() {
            "currency" => {
                if let Some(s) = v.as_str() {
                    rules.currency = s.to_string();
                }
            }
            "reference_attempts" => {
                if let Some(n) = v.as_u64().and_then(|n| u32::try_from(n).ok()) {
                    rules.reference_attempts = n;
                }
            }
            "rate_limit_per_minute" => {
                if let Some(n) = v.as_i64() {
                    rules.rate_limit_per_minute = n;
                }
            }
            "excess_baggage_fee_per_kg" => {
                let fee = match v {
                    Value::String(s) => Decimal::from_str(s).ok(),
                    Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
                    _ => None,
                };
                if let Some(fee) = fee {
                    rules.excess_baggage_fee_per_kg = fee;
                }
            }
            _ => {}
        }
    }

    rules
}

/// Wrap a driver error as a storage failure, logging it.
pub(crate) fn storage_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> CoreError {
    move |e| {
        error!("{}: {}", context, e);
        CoreError::StorageError(format!("{}: {}", context, e))
    }
}

/// Name of the unique constraint (or index) the error tripped, if any.
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Some(db.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

pub(crate) fn foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// Constraint breaches become `ConstraintViolation`; everything else is a
/// storage failure.
pub(crate) fn constraint_or_storage(context: &'static str) -> impl FnOnce(sqlx::Error) -> CoreError {
    move |e| {
        if unique_violation(&e).is_some() || foreign_key_violation(&e) {
            CoreError::ConstraintViolation(format!("{}: {}", context, e))
        } else {
            storage_error(context)(e)
        }
    }
}
