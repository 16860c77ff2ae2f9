use rand::rngs::StdRng;
use rand::SeedableRng;
use skyfare_booking::{BookingManager, BookingRepository, MemoryStore};
use skyfare_catalog::sample::{seed_catalog, SampleGenerator};
use skyfare_catalog::{CatalogRepository, PricingEngine};
use skyfare_core::payment::OfflineGateway;
use skyfare_store::app_config::BusinessRules;
use skyfare_store::{Config, DbClient, PgBookingRepository, PgCatalogRepository, RedisClient};
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogRepository>,
    pub bookings: Arc<BookingManager>,
    pub pricing: PricingEngine,
    /// Rate limiting is off without it.
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub rate_limit_per_minute: i64,
}

impl AppState {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        bookings: Arc<dyn BookingRepository>,
        rules: &BusinessRules,
        auth: AuthConfig,
    ) -> Self {
        let pricing = PricingEngine::new(rules.pricing());
        let manager = BookingManager::new(
            catalog.clone(),
            bookings,
            Arc::new(OfflineGateway),
            pricing.clone(),
        )
        .with_reference_attempts(rules.reference_attempts);

        Self {
            catalog,
            bookings: Arc::new(manager),
            pricing,
            redis: None,
            auth,
            rate_limit_per_minute: rules.rate_limit_per_minute,
        }
    }

    pub fn with_redis(mut self, redis: RedisClient) -> Self {
        self.redis = Some(Arc::new(redis));
        self
    }
}

pub struct Repositories {
    pub catalog: Arc<dyn CatalogRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub rules: BusinessRules,
}

/// Postgres repositories when a database is configured, migrated and with
/// business rule overrides applied. Otherwise an in-memory store filled
/// with sample flights so the service has something to sell.
pub async fn open_repositories(config: &Config) -> anyhow::Result<Repositories> {
    match &config.database {
        Some(database) => {
            let db = DbClient::new(database).await?;
            db.migrate().await?;
            let rules = db.fetch_business_rules(config.business_rules.clone()).await?;
            Ok(Repositories {
                catalog: Arc::new(PgCatalogRepository::new(db.pool.clone())),
                bookings: Arc::new(PgBookingRepository::new(db.pool.clone())),
                rules,
            })
        }
        None => {
            tracing::warn!("No database configured, using an in-memory store");
            let store = Arc::new(MemoryStore::new());
            let mut generator =
                SampleGenerator::new(StdRng::from_entropy(), config.sample.clone());
            let report =
                seed_catalog(store.as_ref(), &mut generator, chrono::Utc::now().date_naive())
                    .await?;
            tracing::info!(
                "Seeded in-memory catalog with {} flights and {} seats",
                report.flights_created,
                report.seats_created
            );
            Ok(Repositories {
                catalog: store.clone(),
                bookings: store,
                rules: config.business_rules.clone(),
            })
        }
    }
}
