use chrono::Utc;
use limo_core::repository::{BookingStore, BookingUnitOfWork};
use limo_core::{BookingError, BookingResult, BookingStatus, BookingView, SeatMap};
use limo_shared::Masked;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub ticket_number: String,
    pub status: BookingStatus,
}

/// Booking Query Service: read paths with the derived status applied, plus
/// cancellation.
pub struct BookingQueryService {
    store: Arc<dyn BookingStore>,
}

impl BookingQueryService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn get_by_ticket_number(&self, ticket_number: &str) -> BookingResult<BookingView> {
        let details = self
            .store
            .find_booking_details(ticket_number)
            .await?
            .ok_or(BookingError::NotFound("Booking"))?;
        Ok(BookingView::from_details(details, Utc::now()))
    }

    #[instrument(skip(self))]
    pub async fn list_by_profile(&self, profile_id: Uuid) -> BookingResult<Vec<BookingView>> {
        let profile = self
            .store
            .find_profile(profile_id)
            .await?
            .ok_or(BookingError::NotFound("Profile"))?;

        let now = Utc::now();
        let details = self.store.list_booking_details(&[profile.id]).await?;
        Ok(details
            .into_iter()
            .map(|d| BookingView::from_details(d, now))
            .collect())
    }

    /// Bookings across every profile registered with `email`.
    #[instrument(skip(self, email), fields(email = %Masked(email)))]
    pub async fn search_by_email(&self, email: &str) -> BookingResult<Vec<BookingView>> {
        let profile_ids: Vec<Uuid> = self
            .store
            .find_profiles_by_email(email)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        if profile_ids.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let details = self.store.list_booking_details(&profile_ids).await?;
        Ok(details
            .into_iter()
            .map(|d| BookingView::from_details(d, now))
            .collect())
    }

    /// Moves a pending or confirmed booking to `CANCELLED`. A booking whose
    /// trip has arrived reads as `COMPLETED` and can no longer be cancelled.
    #[instrument(skip(self))]
    pub async fn cancel(&self, ticket_number: &str) -> BookingResult<Cancellation> {
        let mut uow = self.store.begin().await?;
        match cancel_in(uow.as_mut(), ticket_number).await {
            Ok(cancellation) => {
                uow.commit().await?;
                info!("Booking cancelled");
                Ok(cancellation)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    error!("Rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn seat_map(&self, trip_id: Uuid) -> BookingResult<SeatMap> {
        let trip = self
            .store
            .find_trip(trip_id)
            .await?
            .ok_or(BookingError::NotFound("Trip"))?;
        let seat_numbers = self.store.booked_seat_numbers(trip.id).await?;

        let capacity = trip.capacity();
        let booked = u32::try_from(seat_numbers.len()).unwrap_or(u32::MAX);
        Ok(SeatMap {
            trip_id: trip.id,
            capacity,
            available: capacity.saturating_sub(booked),
            seat_numbers,
        })
    }
}

async fn cancel_in(
    uow: &mut dyn BookingUnitOfWork,
    ticket_number: &str,
) -> BookingResult<Cancellation> {
    let booking = uow
        .lock_booking(ticket_number)
        .await?
        .ok_or(BookingError::NotFound("Booking"))?;

    let current = booking.status.effective(booking.trip_arrival_time, Utc::now());
    let next = BookingStatus::Cancelled;
    if !current.can_transition_to(next) {
        return Err(BookingError::InvalidTransition { from: current, to: next });
    }

    uow.update_booking_status(booking.booking_id, next).await?;
    Ok(Cancellation {
        ticket_number: booking.ticket_number,
        status: next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::{ReservationEngine, ReservationPolicy, ReservationRequest};
    use chrono::{DateTime, Duration};
    use limo_core::{Contact, VehicleClass};
    use limo_store::{MemoryStore, SeededTrip};

    struct Fixture {
        store: MemoryStore,
        engine: ReservationEngine,
        queries: BookingQueryService,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let shared: Arc<dyn BookingStore> = Arc::new(store.clone());
        Fixture {
            engine: ReservationEngine::new(shared.clone(), ReservationPolicy::default()),
            queries: BookingQueryService::new(shared),
            store,
        }
    }

    async fn seed(fx: &Fixture, departure: DateTime<Utc>) -> SeededTrip {
        fx.store
            .seed_trip(VehicleClass::Standard, departure, departure + Duration::hours(4))
            .await
    }

    async fn book(fx: &Fixture, trip: &SeededTrip, email: &str, seats: &[&str]) -> Vec<String> {
        fx.engine
            .reserve(ReservationRequest {
                trip_id: trip.trip_id,
                contact: Contact {
                    full_name: "Tran Thi B".to_string(),
                    phone_number: "0987654321".to_string(),
                    email: email.to_string(),
                },
                seat_numbers: seats.iter().map(|s| s.to_string()).collect(),
                note: None,
                sub_origin_id: trip.pickup_id,
                sub_destination_id: trip.dropoff_id,
            })
            .await
            .unwrap()
            .ticket_numbers
    }

    #[tokio::test]
    async fn test_get_by_ticket_number_joins_trip_and_stops() {
        let fx = fixture();
        let trip = seed(&fx, Utc::now() + Duration::days(2)).await;
        let tickets = book(&fx, &trip, "b@x.com", &["A5"]).await;

        let view = fx.queries.get_by_ticket_number(&tickets[0]).await.unwrap();

        assert_eq!(view.ticket_number, tickets[0]);
        assert_eq!(view.seat_number, "A5");
        assert_eq!(view.origin, "Ha Noi");
        assert_eq!(view.sub_origin, "My Dinh Station, 20 Pham Hung");
        assert_eq!(view.destination, "Ha Long");
        assert_eq!(view.license_plate, "29B-12345");
        assert_eq!(view.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_unknown_ticket_is_not_found() {
        let fx = fixture();
        let err = fx.queries.get_by_ticket_number("NOPE0000").await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound("Booking")));
    }

    #[tokio::test]
    async fn test_arrived_trip_reads_completed() {
        let fx = fixture();
        let trip = seed(&fx, Utc::now() - Duration::days(1)).await;
        let tickets = book(&fx, &trip, "b@x.com", &["A1"]).await;

        let view = fx.queries.get_by_ticket_number(&tickets[0]).await.unwrap();

        assert_eq!(view.status, BookingStatus::Completed);
        assert_eq!(fx.store.bookings().await[0].status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_search_by_email_spans_profiles() {
        let fx = fixture();
        let trip = seed(&fx, Utc::now() + Duration::days(1)).await;
        let contact = Contact {
            full_name: "Le Van C".to_string(),
            phone_number: "0911".to_string(),
            email: "dup@x.com".to_string(),
        };
        fx.store.add_profile(&contact).await;
        let newer = fx.store.add_profile(&contact).await;
        book(&fx, &trip, "dup@x.com", &["A1", "A2"]).await;

        // A booking owned by the newer profile must show up too.
        let mut uow = fx.store.begin().await.unwrap();
        let seat = uow.insert_seat(trip.trip_id, "A3").await.unwrap().unwrap();
        uow.insert_booking(&limo_core::NewBooking {
            ticket_number: "NEWER001".to_string(),
            status: BookingStatus::Pending,
            note: None,
            seat_id: seat.id,
            profile_id: newer.id,
            sub_origin_id: trip.pickup_id,
            sub_destination_id: trip.dropoff_id,
        })
        .await
        .unwrap();
        uow.commit().await.unwrap();

        let views = fx.queries.search_by_email("dup@x.com").await.unwrap();
        assert_eq!(views.len(), 3);
        assert!(views.iter().any(|v| v.ticket_number == "NEWER001"));

        assert!(fx.queries.search_by_email("nobody@x.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_by_profile() {
        let fx = fixture();
        let trip = seed(&fx, Utc::now() + Duration::days(1)).await;
        book(&fx, &trip, "one@x.com", &["A1", "A2"]).await;
        book(&fx, &trip, "two@x.com", &["B1"]).await;

        let profile_id = fx.store.bookings().await[0].profile_id;
        let views = fx.queries.list_by_profile(profile_id).await.unwrap();

        let mut seats: Vec<_> = views.iter().map(|v| v.seat_number.as_str()).collect();
        seats.sort();
        assert_eq!(seats, vec!["A1", "A2"]);

        let err = fx.queries.list_by_profile(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound("Profile")));
    }

    #[tokio::test]
    async fn test_cancel_confirmed_booking() {
        let fx = fixture();
        let trip = seed(&fx, Utc::now() + Duration::days(1)).await;
        let tickets = book(&fx, &trip, "b@x.com", &["D1"]).await;

        let cancellation = fx.queries.cancel(&tickets[0]).await.unwrap();

        assert_eq!(cancellation.ticket_number, tickets[0]);
        assert_eq!(cancellation.status, BookingStatus::Cancelled);
        let view = fx.queries.get_by_ticket_number(&tickets[0]).await.unwrap();
        assert_eq!(view.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_twice_is_rejected() {
        let fx = fixture();
        let trip = seed(&fx, Utc::now() + Duration::days(1)).await;
        let tickets = book(&fx, &trip, "b@x.com", &["D2"]).await;
        fx.queries.cancel(&tickets[0]).await.unwrap();

        let err = fx.queries.cancel(&tickets[0]).await.unwrap_err();

        assert!(matches!(
            err,
            BookingError::InvalidTransition {
                from: BookingStatus::Cancelled,
                to: BookingStatus::Cancelled
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_completed_booking_is_rejected() {
        let fx = fixture();
        let trip = seed(&fx, Utc::now() - Duration::days(3)).await;
        let tickets = book(&fx, &trip, "b@x.com", &["D3"]).await;

        let err = fx.queries.cancel(&tickets[0]).await.unwrap_err();

        assert!(matches!(
            err,
            BookingError::InvalidTransition { from: BookingStatus::Completed, .. }
        ));
        assert_eq!(fx.store.bookings().await[0].status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_cancel_unknown_ticket() {
        let fx = fixture();
        let err = fx.queries.cancel("ABCD1234").await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound("Booking")));
    }

    #[tokio::test]
    async fn test_seat_map() {
        let fx = fixture();
        let trip = seed(&fx, Utc::now() + Duration::days(1)).await;
        book(&fx, &trip, "b@x.com", &["C2", "A1", "B7"]).await;

        let map = fx.queries.seat_map(trip.trip_id).await.unwrap();

        assert_eq!(map.capacity, 36);
        assert_eq!(map.available, 33);
        assert_eq!(map.seat_numbers, vec!["A1", "B7", "C2"]);

        let err = fx.queries.seat_map(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound("Trip")));
    }
}
