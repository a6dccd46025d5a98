use crate::lookup;
use crate::ticket::{RandomTicketNumbers, TicketNumberSource};
use limo_core::repository::{BookingStore, BookingUnitOfWork};
use limo_core::{Booking, BookingError, BookingResult, BookingStatus, Contact, NewBooking, Profile, Seat};
use limo_shared::Masked;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Seats to reserve on one trip for one contact.
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub trip_id: Uuid,
    pub contact: Contact,
    pub seat_numbers: Vec<String>,
    pub note: Option<String>,
    pub sub_origin_id: Uuid,
    pub sub_destination_id: Uuid,
}

impl ReservationRequest {
    fn normalized(mut self) -> BookingResult<Self> {
        if self.seat_numbers.is_empty() {
            return Err(BookingError::Validation("seatNumbers must not be empty".to_string()));
        }
        if self.contact.email.trim().is_empty() {
            return Err(BookingError::Validation("email is required".to_string()));
        }
        if self.contact.full_name.trim().is_empty() {
            return Err(BookingError::Validation("fullName is required".to_string()));
        }

        for seat_number in self.seat_numbers.iter_mut() {
            let trimmed = seat_number.trim();
            if trimmed.is_empty() {
                return Err(BookingError::Validation("seat number must not be blank".to_string()));
            }
            *seat_number = trimmed.to_string();
        }

        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationReceipt {
    pub profile_id: Uuid,
    /// One per seat, in request order.
    pub ticket_numbers: Vec<String>,
}

impl ReservationReceipt {
    pub fn total_tickets(&self) -> usize {
        self.ticket_numbers.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReservationPolicy {
    pub ticket_number_attempts: u32,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self { ticket_number_attempts: 10 }
    }
}

/// Seat Reservation Engine.
///
/// A request for N seats either creates N seats and N bookings under one
/// profile, or leaves the store untouched.
pub struct ReservationEngine {
    store: Arc<dyn BookingStore>,
    tickets: Arc<dyn TicketNumberSource>,
    policy: ReservationPolicy,
}

impl ReservationEngine {
    pub fn new(store: Arc<dyn BookingStore>, policy: ReservationPolicy) -> Self {
        Self {
            store,
            tickets: Arc::new(RandomTicketNumbers),
            policy,
        }
    }

    pub fn with_ticket_source(mut self, tickets: Arc<dyn TicketNumberSource>) -> Self {
        self.tickets = tickets;
        self
    }

    #[instrument(
        skip(self, request),
        fields(trip_id = %request.trip_id, seats = request.seat_numbers.len())
    )]
    pub async fn reserve(&self, request: ReservationRequest) -> BookingResult<ReservationReceipt> {
        let request = request.normalized()?;
        debug!(email = %Masked(&request.contact.email), "Reserving seats");

        let mut uow = self.store.begin().await?;
        match self.reserve_in(uow.as_mut(), &request).await {
            Ok(receipt) => {
                uow.commit().await?;
                info!(
                    profile_id = %receipt.profile_id,
                    tickets = receipt.total_tickets(),
                    "Reservation committed"
                );
                Ok(receipt)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    error!("Rollback failed: {}", rollback_err);
                }
                warn!("Reservation rolled back: {}", err);
                Err(err)
            }
        }
    }

    async fn reserve_in(
        &self,
        uow: &mut dyn BookingUnitOfWork,
        request: &ReservationRequest,
    ) -> BookingResult<ReservationReceipt> {
        let trip = lookup::find_trip(uow, request.trip_id).await?;
        let profile = lookup::find_or_create_profile(uow, &request.contact).await?;

        let mut ticket_numbers = Vec::with_capacity(request.seat_numbers.len());
        for seat_number in &request.seat_numbers {
            if uow.seat_exists(trip.id, seat_number).await? {
                return Err(BookingError::SeatAlreadyBooked(seat_number.clone()));
            }
            let seat = uow
                .insert_seat(trip.id, seat_number)
                .await?
                .ok_or_else(|| BookingError::SeatAlreadyBooked(seat_number.clone()))?;

            let booking = self.book_seat(uow, &seat, &profile, request).await?;
            debug!(seat = %seat.seat_number, ticket = %booking.ticket_number, "Seat booked");
            ticket_numbers.push(booking.ticket_number);
        }

        // Checked after the seat loop so a taken label reports as such even
        // on a full trip. The trip lock keeps the count stable.
        let capacity = trip.capacity();
        let booked = uow.count_seats(trip.id).await?;
        if booked > capacity {
            let requested = u32::try_from(ticket_numbers.len()).unwrap_or(u32::MAX);
            return Err(BookingError::TripFull {
                capacity,
                available: capacity.saturating_sub(booked.saturating_sub(requested)),
                requested,
            });
        }

        Ok(ReservationReceipt {
            profile_id: profile.id,
            ticket_numbers,
        })
    }

    /// Inserts the booking for a claimed seat under a fresh ticket number.
    async fn book_seat(
        &self,
        uow: &mut dyn BookingUnitOfWork,
        seat: &Seat,
        profile: &Profile,
        request: &ReservationRequest,
    ) -> BookingResult<Booking> {
        let attempts = self.policy.ticket_number_attempts;
        for attempt in 1..=attempts {
            let ticket_number = self.tickets.generate();
            if uow.ticket_number_exists(&ticket_number).await? {
                debug!(attempt, "Ticket number collision");
                continue;
            }

            let new_booking = NewBooking {
                ticket_number,
                status: BookingStatus::Confirmed,
                note: request.note.clone(),
                seat_id: seat.id,
                profile_id: profile.id,
                sub_origin_id: request.sub_origin_id,
                sub_destination_id: request.sub_destination_id,
            };
            if let Some(booking) = uow.insert_booking(&new_booking).await? {
                return Ok(booking);
            }
            debug!(attempt, "Ticket number taken concurrently");
        }

        Err(BookingError::TicketNumberExhausted(attempts))
    }
}
