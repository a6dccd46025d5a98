pub mod models;
pub mod repository;

pub use models::{
    Booking, BookingDetails, BookingStatus, BookingView, Contact, LockedBooking, NewBooking,
    Profile, Seat, SeatMap, StopDetails, Trip, TripStatus, VehicleClass,
};
pub use repository::{BookingStore, BookingUnitOfWork, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Referenced record does not exist: {0}")]
    MissingReference(String),
    #[error("Session store error: {0}")]
    Session(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Seat {0} already booked")]
    SeatAlreadyBooked(String),
    #[error("Could not generate unique ticket number after {0} attempts")]
    TicketNumberExhausted(u32),
    #[error("Trip has {available} of {capacity} seats left, {requested} requested")]
    TripFull {
        capacity: u32,
        available: u32,
        requested: u32,
    },
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Booking cannot move from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type BookingResult<T> = Result<T, BookingError>;
