pub mod app_config;
pub mod database;
pub mod catalog_repo;
pub mod booking_repo;
pub mod redis_repo;

pub use app_config::Config;
pub use booking_repo::PgBookingRepository;
pub use catalog_repo::PgCatalogRepository;
pub use database::DbClient;
pub use redis_repo::RedisClient;
