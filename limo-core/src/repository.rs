use async_trait::async_trait;
use uuid::Uuid;
use crate::models::{
    Booking, BookingDetails, BookingStatus, Contact, LockedBooking, NewBooking, Profile, Seat, Trip,
};
use crate::StoreError;

/// Entry point to booking persistence: read paths plus units of work.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Open an atomic unit of work. Dropping it without `commit` discards
    /// every write made through it.
    async fn begin(&self) -> Result<Box<dyn BookingUnitOfWork>, StoreError>;

    async fn find_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StoreError>;

    /// Seat labels claimed on a trip, sorted ascending.
    async fn booked_seat_numbers(&self, trip_id: Uuid) -> Result<Vec<String>, StoreError>;

    async fn find_profile(&self, profile_id: Uuid) -> Result<Option<Profile>, StoreError>;

    /// Every profile registered with `email`, oldest first.
    async fn find_profiles_by_email(&self, email: &str) -> Result<Vec<Profile>, StoreError>;

    async fn find_booking_details(
        &self,
        ticket_number: &str,
    ) -> Result<Option<BookingDetails>, StoreError>;

    /// Bookings owned by any of `profile_ids`, in booking order.
    async fn list_booking_details(
        &self,
        profile_ids: &[Uuid],
    ) -> Result<Vec<BookingDetails>, StoreError>;
}

/// Writes executed inside one transaction.
#[async_trait]
pub trait BookingUnitOfWork: Send {
    /// Reads the trip and locks it until the unit of work ends. A second
    /// unit of work reading the same trip waits for the first to finish.
    async fn find_trip(&mut self, trip_id: Uuid) -> Result<Option<Trip>, StoreError>;

    /// Oldest profile for `email`. Serializes concurrent resolutions of the
    /// same email for the rest of the unit of work.
    async fn find_profile_by_email(&mut self, email: &str) -> Result<Option<Profile>, StoreError>;

    async fn create_profile(&mut self, contact: &Contact) -> Result<Profile, StoreError>;

    async fn count_seats(&mut self, trip_id: Uuid) -> Result<u32, StoreError>;

    async fn seat_exists(&mut self, trip_id: Uuid, seat_number: &str) -> Result<bool, StoreError>;

    /// Claims `(trip_id, seat_number)`. `None` means another writer holds it.
    async fn insert_seat(
        &mut self,
        trip_id: Uuid,
        seat_number: &str,
    ) -> Result<Option<Seat>, StoreError>;

    async fn ticket_number_exists(&mut self, ticket_number: &str) -> Result<bool, StoreError>;

    /// `None` means the ticket number was taken concurrently.
    async fn insert_booking(&mut self, booking: &NewBooking) -> Result<Option<Booking>, StoreError>;

    async fn lock_booking(&mut self, ticket_number: &str) -> Result<Option<LockedBooking>, StoreError>;

    async fn update_booking_status(
        &mut self,
        booking_id: Uuid,
        status: BookingStatus,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Short-lived session state kept outside the relational store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn is_token_blacklisted(&self, token: &str) -> Result<bool, StoreError>;

    /// Counts a hit against `key` and reports whether it is within `limit`
    /// for the current window.
    async fn check_rate_limit(
        &self,
        key: &str,
        limit: i64,
        window_seconds: i64,
    ) -> Result<bool, StoreError>;
}
