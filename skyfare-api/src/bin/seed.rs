//! Fills the configured database with reference data and sample flights.
//!
//! `SKYFARE_SEED` fixes the random seed; repeated runs with the same seed
//! replay the same flights, which are skipped as duplicates.

use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use skyfare_catalog::sample::{seed_catalog, SampleGenerator};
use skyfare_store::{Config, DbClient, PgCatalogRepository};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skyfare_seed=info,skyfare_catalog=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let database = config
        .database
        .as_ref()
        .context("seeding needs [database] to be configured")?;

    let db = DbClient::new(database).await?;
    db.migrate().await?;
    let repo = PgCatalogRepository::new(db.pool.clone());

    let rng = match std::env::var("SKYFARE_SEED") {
        Ok(raw) => {
            let seed: u64 = raw.parse().context("SKYFARE_SEED must be an integer")?;
            StdRng::seed_from_u64(seed)
        }
        Err(_) => StdRng::from_entropy(),
    };
    let mut generator = SampleGenerator::new(rng, config.sample.clone());

    let report = seed_catalog(&repo, &mut generator, chrono::Utc::now().date_naive()).await?;

    tracing::info!(
        "Created {} airports, {} airlines, {} aircraft",
        report.airports_created,
        report.airlines_created,
        report.aircraft_created
    );
    tracing::info!(
        "Created {} flights ({} skipped) with {} seats; {} flights in total",
        report.flights_created,
        report.flights_skipped,
        report.seats_created,
        report.total_flights
    );

    Ok(())
}
