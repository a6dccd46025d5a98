//! Trip lookup and profile resolution inside a reservation unit of work.

use limo_core::repository::BookingUnitOfWork;
use limo_core::{BookingError, BookingResult, Contact, Profile, Trip};
use limo_shared::Masked;
use tracing::{debug, info};
use uuid::Uuid;

pub async fn find_trip(uow: &mut dyn BookingUnitOfWork, trip_id: Uuid) -> BookingResult<Trip> {
    uow.find_trip(trip_id)
        .await?
        .ok_or(BookingError::NotFound("Trip"))
}

/// Returns the oldest profile registered with the contact's email, unmodified,
/// or creates one from the contact.
pub async fn find_or_create_profile(
    uow: &mut dyn BookingUnitOfWork,
    contact: &Contact,
) -> BookingResult<Profile> {
    if let Some(profile) = uow.find_profile_by_email(&contact.email).await? {
        debug!(profile_id = %profile.id, "Reusing profile");
        return Ok(profile);
    }

    let profile = uow.create_profile(contact).await?;
    info!(profile_id = %profile.id, email = %Masked(&contact.email), "Created profile");
    Ok(profile)
}
