use rust_decimal::Decimal;
use serde::Deserialize;
use skyfare_catalog::sample::SampleConfig;
use skyfare_catalog::PricingConfig;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// Absent: bookings and catalog live in memory.
    pub database: Option<DatabaseConfig>,
    /// Absent: no rate limiting.
    pub redis: Option<RedisConfig>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub sample: SampleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_reference_attempts")]
    pub reference_attempts: u32,
    pub excess_baggage_fee_per_kg: Decimal,
    /// Requests per client IP per minute.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_reference_attempts() -> u32 {
    5
}

fn default_rate_limit() -> i64 {
    120
}

impl BusinessRules {
    pub fn pricing(&self) -> PricingConfig {
        PricingConfig {
            currency: self.currency.clone(),
            excess_baggage_fee_per_kg: self.excess_baggage_fee_per_kg,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    /// Layered load from `dir`: `default`, then `{RUN_MODE}` and `local` if
    /// present, then `SKYFARE__*` environment variables.
    pub fn load_from(dir: &str) -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name(&format!("{}/default", dir)))
            .add_source(config::File::with_name(&format!("{}/{}", dir, run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name(&format!("{}/local", dir)).required(false))
            // e.g. SKYFARE__DATABASE__URL=postgres://...
            .add_source(config::Environment::with_prefix("SKYFARE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
