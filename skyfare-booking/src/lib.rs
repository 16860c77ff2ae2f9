pub mod models;
pub mod reference;
pub mod passengers;
pub mod repository;
pub mod manager;
pub mod memory;

pub use models::{
    Baggage, Booking, BookingDetail, BookingStatus, Gender, Passenger, PassengerDetails, Payment,
    SeatAssignment,
};
pub use manager::BookingManager;
pub use memory::MemoryStore;
pub use reference::BookingReference;
pub use repository::BookingRepository;
