//! In-memory implementation of the store traits.
//!
//! A unit of work holds the store-wide lock from `begin` until it ends and
//! writes into a private copy of the state, so units of work are fully
//! serialized and a rollback (or drop) leaves no trace. Foreign keys that
//! Postgres would enforce are checked on insert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use limo_core::repository::{BookingStore, BookingUnitOfWork, SessionStore};
use limo_core::{
    Booking, BookingDetails, BookingStatus, Contact, LockedBooking, NewBooking, Profile, Seat,
    StopDetails, StoreError, Trip, TripStatus, VehicleClass,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct LocationRecord {
    name: String,
}

#[derive(Debug, Clone)]
struct SubLocationRecord {
    location_id: Uuid,
    name: String,
    address: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    locations: HashMap<Uuid, LocationRecord>,
    sub_locations: HashMap<Uuid, SubLocationRecord>,
    vehicles: HashMap<Uuid, String>,
    trips: HashMap<Uuid, Trip>,
    // Vecs keep insertion order, which doubles as creation order.
    profiles: Vec<Profile>,
    seats: Vec<Seat>,
    bookings: Vec<Booking>,
}

impl MemoryState {
    fn stop(&self, sub_location_id: Uuid) -> Option<StopDetails> {
        let sub = self.sub_locations.get(&sub_location_id)?;
        Some(StopDetails {
            name: sub.name.clone(),
            address: sub.address.clone(),
            location_name: self.locations.get(&sub.location_id).map(|l| l.name.clone()),
        })
    }

    fn details(&self, booking: &Booking) -> Option<BookingDetails> {
        let seat = self.seats.iter().find(|s| s.id == booking.seat_id)?;
        let trip = self.trips.get(&seat.trip_id)?;
        Some(BookingDetails {
            ticket_number: booking.ticket_number.clone(),
            status: booking.status,
            booking_time: booking.booking_time,
            note: booking.note.clone(),
            seat_number: seat.seat_number.clone(),
            departure_time: trip.departure_time,
            arrival_time: trip.arrival_time,
            license_plate: self.vehicles.get(&trip.vehicle_id).cloned(),
            sub_origin: self.stop(booking.sub_origin_id)?,
            sub_destination: self.stop(booking.sub_destination_id)?,
        })
    }

    fn seat_taken(&self, trip_id: Uuid, seat_number: &str) -> bool {
        self.seats
            .iter()
            .any(|s| s.trip_id == trip_id && s.seat_number == seat_number)
    }
}

/// Ids of a trip seeded with [`MemoryStore::seed_trip`].
#[derive(Debug, Clone, Copy)]
pub struct SeededTrip {
    pub trip_id: Uuid,
    pub pickup_id: Uuid,
    pub dropoff_id: Uuid,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_booking_inserts: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_location(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state
            .lock()
            .await
            .locations
            .insert(id, LocationRecord { name: name.to_string() });
        id
    }

    pub async fn add_sub_location(&self, location_id: Uuid, name: &str, address: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().await.sub_locations.insert(
            id,
            SubLocationRecord {
                location_id,
                name: name.to_string(),
                address: address.map(str::to_string),
            },
        );
        id
    }

    pub async fn add_vehicle(&self, license_plate: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().await.vehicles.insert(id, license_plate.to_string());
        id
    }

    pub async fn add_trip(&self, trip: Trip) -> Uuid {
        let id = trip.id;
        self.state.lock().await.trips.insert(id, trip);
        id
    }

    /// Inserts a profile directly, bypassing resolution. Lets tests set up
    /// several profiles sharing one email.
    pub async fn add_profile(&self, contact: &Contact) -> Profile {
        let profile = new_profile(contact);
        self.state.lock().await.profiles.push(profile.clone());
        profile
    }

    /// Seeds a Ha Noi → Ha Long trip with one pickup and one drop-off point.
    pub async fn seed_trip(
        &self,
        vehicle_class: VehicleClass,
        departure_time: DateTime<Utc>,
        arrival_time: DateTime<Utc>,
    ) -> SeededTrip {
        let origin = self.add_location("Ha Noi").await;
        let destination = self.add_location("Ha Long").await;
        let pickup_id = self.add_sub_location(origin, "My Dinh Station", Some("20 Pham Hung")).await;
        let dropoff_id = self.add_sub_location(destination, "Bai Chay", Some("Ha Long Road")).await;
        let vehicle_id = self.add_vehicle("29B-12345").await;

        let trip_id = self
            .add_trip(Trip {
                id: Uuid::new_v4(),
                departure_time,
                arrival_time,
                vehicle_class,
                price: 200_000,
                status: TripStatus::Scheduled,
                vehicle_id,
                origin_location_id: origin,
                destination_location_id: destination,
            })
            .await;

        SeededTrip { trip_id, pickup_id, dropoff_id }
    }

    /// Makes every subsequent booking insert fail with a storage error.
    pub fn fail_booking_inserts(&self, fail: bool) {
        self.fail_booking_inserts.store(fail, Ordering::SeqCst);
    }

    pub async fn seat_count(&self) -> usize {
        self.state.lock().await.seats.len()
    }

    pub async fn booking_count(&self) -> usize {
        self.state.lock().await.bookings.len()
    }

    pub async fn profile_count(&self) -> usize {
        self.state.lock().await.profiles.len()
    }

    pub async fn bookings(&self) -> Vec<Booking> {
        self.state.lock().await.bookings.clone()
    }
}

fn new_profile(contact: &Contact) -> Profile {
    Profile {
        id: Uuid::new_v4(),
        full_name: contact.full_name.clone(),
        phone_number: contact.phone_number.clone(),
        email: contact.email.clone(),
        created_at: Utc::now(),
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn BookingUnitOfWork>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let pending = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            pending,
            fail_booking_inserts: self.fail_booking_inserts.load(Ordering::SeqCst),
        }))
    }

    async fn find_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StoreError> {
        Ok(self.state.lock().await.trips.get(&trip_id).cloned())
    }

    async fn booked_seat_numbers(&self, trip_id: Uuid) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        let mut seats: Vec<String> = state
            .seats
            .iter()
            .filter(|s| s.trip_id == trip_id)
            .map(|s| s.seat_number.clone())
            .collect();
        seats.sort();
        Ok(seats)
    }

    async fn find_profile(&self, profile_id: Uuid) -> Result<Option<Profile>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.profiles.iter().find(|p| p.id == profile_id).cloned())
    }

    async fn find_profiles_by_email(&self, email: &str) -> Result<Vec<Profile>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.profiles.iter().filter(|p| p.email == email).cloned().collect())
    }

    async fn find_booking_details(
        &self,
        ticket_number: &str,
    ) -> Result<Option<BookingDetails>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .iter()
            .find(|b| b.ticket_number == ticket_number)
            .and_then(|b| state.details(b)))
    }

    async fn list_booking_details(
        &self,
        profile_ids: &[Uuid],
    ) -> Result<Vec<BookingDetails>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .iter()
            .filter(|b| profile_ids.contains(&b.profile_id))
            .filter_map(|b| state.details(b))
            .collect())
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    pending: MemoryState,
    fail_booking_inserts: bool,
}

#[async_trait]
impl BookingUnitOfWork for MemoryUnitOfWork {
    async fn find_trip(&mut self, trip_id: Uuid) -> Result<Option<Trip>, StoreError> {
        Ok(self.pending.trips.get(&trip_id).cloned())
    }

    async fn find_profile_by_email(&mut self, email: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.pending.profiles.iter().find(|p| p.email == email).cloned())
    }

    async fn create_profile(&mut self, contact: &Contact) -> Result<Profile, StoreError> {
        let profile = new_profile(contact);
        self.pending.profiles.push(profile.clone());
        Ok(profile)
    }

    async fn count_seats(&mut self, trip_id: Uuid) -> Result<u32, StoreError> {
        let count = self.pending.seats.iter().filter(|s| s.trip_id == trip_id).count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn seat_exists(&mut self, trip_id: Uuid, seat_number: &str) -> Result<bool, StoreError> {
        Ok(self.pending.seat_taken(trip_id, seat_number))
    }

    async fn insert_seat(
        &mut self,
        trip_id: Uuid,
        seat_number: &str,
    ) -> Result<Option<Seat>, StoreError> {
        if !self.pending.trips.contains_key(&trip_id) {
            return Err(StoreError::MissingReference(format!("trip {}", trip_id)));
        }
        if self.pending.seat_taken(trip_id, seat_number) {
            return Ok(None);
        }

        let seat = Seat {
            id: Uuid::new_v4(),
            trip_id,
            seat_number: seat_number.to_string(),
        };
        self.pending.seats.push(seat.clone());
        Ok(Some(seat))
    }

    async fn ticket_number_exists(&mut self, ticket_number: &str) -> Result<bool, StoreError> {
        Ok(self.pending.bookings.iter().any(|b| b.ticket_number == ticket_number))
    }

    async fn insert_booking(&mut self, booking: &NewBooking) -> Result<Option<Booking>, StoreError> {
        if self.fail_booking_inserts {
            return Err(StoreError::Database("connection reset while inserting booking".to_string()));
        }
        if !self.pending.seats.iter().any(|s| s.id == booking.seat_id) {
            return Err(StoreError::MissingReference(format!("seat {}", booking.seat_id)));
        }
        if !self.pending.profiles.iter().any(|p| p.id == booking.profile_id) {
            return Err(StoreError::MissingReference(format!("profile {}", booking.profile_id)));
        }
        // seat_id is UNIQUE without an ON CONFLICT clause, so a second
        // booking for one seat is an error rather than a collision.
        if self.pending.bookings.iter().any(|b| b.seat_id == booking.seat_id) {
            return Err(StoreError::Database(format!(
                "duplicate key value violates unique constraint on booking.seat_id {}",
                booking.seat_id
            )));
        }
        for sub_location_id in [booking.sub_origin_id, booking.sub_destination_id] {
            if !self.pending.sub_locations.contains_key(&sub_location_id) {
                return Err(StoreError::MissingReference(format!("sub_location {}", sub_location_id)));
            }
        }
        if self.pending.bookings.iter().any(|b| b.ticket_number == booking.ticket_number) {
            return Ok(None);
        }

        let record = Booking {
            id: Uuid::new_v4(),
            ticket_number: booking.ticket_number.clone(),
            status: booking.status,
            booking_time: Utc::now(),
            note: booking.note.clone(),
            seat_id: booking.seat_id,
            profile_id: booking.profile_id,
            sub_origin_id: booking.sub_origin_id,
            sub_destination_id: booking.sub_destination_id,
        };
        self.pending.bookings.push(record.clone());
        Ok(Some(record))
    }

    async fn lock_booking(&mut self, ticket_number: &str) -> Result<Option<LockedBooking>, StoreError> {
        let Some(booking) = self.pending.bookings.iter().find(|b| b.ticket_number == ticket_number) else {
            return Ok(None);
        };
        let arrival = self
            .pending
            .seats
            .iter()
            .find(|s| s.id == booking.seat_id)
            .and_then(|s| self.pending.trips.get(&s.trip_id))
            .map(|t| t.arrival_time)
            .ok_or_else(|| StoreError::MissingReference(format!("seat {}", booking.seat_id)))?;

        Ok(Some(LockedBooking {
            booking_id: booking.id,
            ticket_number: booking.ticket_number.clone(),
            status: booking.status,
            trip_arrival_time: arrival,
        }))
    }

    async fn update_booking_status(
        &mut self,
        booking_id: Uuid,
        status: BookingStatus,
    ) -> Result<(), StoreError> {
        if let Some(booking) = self.pending.bookings.iter_mut().find(|b| b.id == booking_id) {
            booking.status = status;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUnitOfWork { mut guard, pending, .. } = *self;
        *guard = pending;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Session store double: explicit blacklist, unbounded counters.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    blacklist: Arc<std::sync::Mutex<HashSet<String>>>,
    hits: Arc<std::sync::Mutex<HashMap<String, i64>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blacklist(&self, token: &str) {
        if let Ok(mut set) = self.blacklist.lock() {
            set.insert(token.to_string());
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn is_token_blacklisted(&self, token: &str) -> Result<bool, StoreError> {
        self.blacklist
            .lock()
            .map(|set| set.contains(token))
            .map_err(|e| StoreError::Session(e.to_string()))
    }

    async fn check_rate_limit(
        &self,
        key: &str,
        limit: i64,
        _window_seconds: i64,
    ) -> Result<bool, StoreError> {
        let mut hits = self.hits.lock().map_err(|e| StoreError::Session(e.to_string()))?;
        let count = hits.entry(key.to_string()).or_insert(0);
        *count += 1;
        Ok(*count <= limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn contact(email: &str) -> Contact {
        Contact {
            full_name: "Nguyen Van A".to_string(),
            phone_number: "0912345678".to_string(),
            email: email.to_string(),
        }
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryStore::new();
        let trip = store
            .seed_trip(VehicleClass::Standard, Utc::now() + Duration::days(1), Utc::now() + Duration::days(2))
            .await;

        let mut uow = store.begin().await.unwrap();
        uow.create_profile(&contact("a@x.com")).await.unwrap();
        assert!(uow.insert_seat(trip.trip_id, "A1").await.unwrap().is_some());
        uow.rollback().await.unwrap();

        assert_eq!(store.seat_count().await, 0);
        assert_eq!(store.profile_count().await, 0);
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_discards_writes() {
        let store = MemoryStore::new();
        let trip = store
            .seed_trip(VehicleClass::Vip, Utc::now() + Duration::days(1), Utc::now() + Duration::days(2))
            .await;

        {
            let mut uow = store.begin().await.unwrap();
            uow.insert_seat(trip.trip_id, "A1").await.unwrap();
        }

        assert_eq!(store.seat_count().await, 0);
    }

    #[tokio::test]
    async fn test_insert_seat_reports_collision_as_none() {
        let store = MemoryStore::new();
        let trip = store
            .seed_trip(VehicleClass::Standard, Utc::now() + Duration::days(1), Utc::now() + Duration::days(2))
            .await;

        let mut uow = store.begin().await.unwrap();
        assert!(uow.insert_seat(trip.trip_id, "B1").await.unwrap().is_some());
        assert!(uow.insert_seat(trip.trip_id, "B1").await.unwrap().is_none());
        uow.commit().await.unwrap();

        assert_eq!(store.booked_seat_numbers(trip.trip_id).await.unwrap(), vec!["B1".to_string()]);
    }

    #[tokio::test]
    async fn test_profiles_by_email_oldest_first() {
        let store = MemoryStore::new();
        let first = store.add_profile(&contact("dup@x.com")).await;
        let second = store.add_profile(&contact("dup@x.com")).await;

        let found = store.find_profiles_by_email("dup@x.com").await.unwrap();
        assert_eq!(found.iter().map(|p| p.id).collect::<Vec<_>>(), vec![first.id, second.id]);

        let mut uow = store.begin().await.unwrap();
        let resolved = uow.find_profile_by_email("dup@x.com").await.unwrap().unwrap();
        assert_eq!(resolved.id, first.id);
    }

    #[tokio::test]
    async fn test_insert_booking_enforces_seat_and_profile_keys() {
        let store = MemoryStore::new();
        let trip = store
            .seed_trip(VehicleClass::Standard, Utc::now() + Duration::days(1), Utc::now() + Duration::days(2))
            .await;

        let mut uow = store.begin().await.unwrap();
        let profile = uow.create_profile(&contact("a@x.com")).await.unwrap();
        let seat = uow.insert_seat(trip.trip_id, "C1").await.unwrap().unwrap();
        let booking = |ticket: &str, seat_id: Uuid, profile_id: Uuid| NewBooking {
            ticket_number: ticket.to_string(),
            status: BookingStatus::Confirmed,
            note: None,
            seat_id,
            profile_id,
            sub_origin_id: trip.pickup_id,
            sub_destination_id: trip.dropoff_id,
        };

        assert!(uow.insert_booking(&booking("AAAA0001", seat.id, profile.id)).await.unwrap().is_some());

        let second_for_seat = uow.insert_booking(&booking("AAAA0002", seat.id, profile.id)).await;
        assert!(matches!(second_for_seat, Err(StoreError::Database(_))));

        let unknown_seat = uow.insert_booking(&booking("AAAA0003", Uuid::new_v4(), profile.id)).await;
        assert!(matches!(unknown_seat, Err(StoreError::MissingReference(_))));

        let other_seat = uow.insert_seat(trip.trip_id, "C2").await.unwrap().unwrap();
        let unknown_profile = uow
            .insert_booking(&booking("AAAA0004", other_seat.id, Uuid::new_v4()))
            .await;
        assert!(matches!(unknown_profile, Err(StoreError::MissingReference(_))));
    }

    #[tokio::test]
    async fn test_rate_limit_counts_per_key() {
        let sessions = MemorySessionStore::new();
        assert!(sessions.check_rate_limit("ratelimit:1.1.1.1", 2, 60).await.unwrap());
        assert!(sessions.check_rate_limit("ratelimit:1.1.1.1", 2, 60).await.unwrap());
        assert!(!sessions.check_rate_limit("ratelimit:1.1.1.1", 2, 60).await.unwrap());
        assert!(sessions.check_rate_limit("ratelimit:2.2.2.2", 2, 60).await.unwrap());
    }
}
