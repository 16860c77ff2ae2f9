pub mod models;
pub mod pricing;
pub mod inventory;
pub mod repository;
pub mod search;
pub mod sample;

pub use models::{
    Aircraft, Airline, Airport, ClassType, Flight, FlightDetail, FlightStatus, Seat, SeatClass,
};
pub use pricing::{PricingConfig, PricingEngine};
pub use repository::{CatalogRepository, Destination, FlightFilter, FlightPlan};
pub use search::{FlightSearchRequest, FlightSearchResult, HomePage};
