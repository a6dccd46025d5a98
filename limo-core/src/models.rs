use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A stored enum column held a value this build does not know about.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

// ============================================================================
// Trip
// ============================================================================

/// Vehicle class sold on a trip. Seat capacity follows from the class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleClass {
    Standard,
    Vip,
}

impl VehicleClass {
    pub const fn capacity(self) -> u32 {
        match self {
            VehicleClass::Standard => 36,
            VehicleClass::Vip => 20,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            VehicleClass::Standard => "STANDARD",
            VehicleClass::Vip => "VIP",
        }
    }
}

impl FromStr for VehicleClass {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STANDARD" => Ok(VehicleClass::Standard),
            "VIP" => Ok(VehicleClass::Vip),
            other => Err(UnknownVariant { kind: "vehicle class", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Scheduled,
    Ongoing,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            TripStatus::Scheduled => "SCHEDULED",
            TripStatus::Ongoing => "ONGOING",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for TripStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(TripStatus::Scheduled),
            "ONGOING" => Ok(TripStatus::Ongoing),
            "COMPLETED" => Ok(TripStatus::Completed),
            "CANCELLED" => Ok(TripStatus::Cancelled),
            other => Err(UnknownVariant { kind: "trip status", value: other.to_string() }),
        }
    }
}

/// A scheduled vehicle run between two locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub vehicle_class: VehicleClass,
    /// Unit price in minor currency units.
    pub price: i64,
    pub status: TripStatus,
    pub vehicle_id: Uuid,
    pub origin_location_id: Uuid,
    pub destination_location_id: Uuid,
}

impl Trip {
    pub const fn capacity(&self) -> u32 {
        self.vehicle_class.capacity()
    }
}

// ============================================================================
// Profile
// ============================================================================

/// Customer contact record. Several profiles may share one email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub phone_number: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Contact details supplied with a reservation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub full_name: String,
    pub phone_number: String,
    pub email: String,
}

// ============================================================================
// Seat & Booking
// ============================================================================

/// A claimed seat. Its existence is the reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub seat_number: String,
}

/// Booking lifecycle status.
///
/// `Completed` is never written: it is derived at read time from the trip's
/// arrival time and takes precedence over the stored value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        }
    }

    /// Status as seen by readers at `now`.
    pub fn effective(self, trip_arrival: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if trip_arrival < now {
            BookingStatus::Completed
        } else {
            self
        }
    }

    pub const fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            other => Err(UnknownVariant { kind: "booking status", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub ticket_number: String,
    pub status: BookingStatus,
    pub booking_time: DateTime<Utc>,
    pub note: Option<String>,
    pub seat_id: Uuid,
    pub profile_id: Uuid,
    pub sub_origin_id: Uuid,
    pub sub_destination_id: Uuid,
}

/// Insert payload for a booking row.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub ticket_number: String,
    pub status: BookingStatus,
    pub note: Option<String>,
    pub seat_id: Uuid,
    pub profile_id: Uuid,
    pub sub_origin_id: Uuid,
    pub sub_destination_id: Uuid,
}

/// A booking row locked for a status change, with the arrival time needed to
/// compute its effective status.
#[derive(Debug, Clone)]
pub struct LockedBooking {
    pub booking_id: Uuid,
    pub ticket_number: String,
    pub status: BookingStatus,
    pub trip_arrival_time: DateTime<Utc>,
}

// ============================================================================
// Read model
// ============================================================================

/// Pickup or drop-off point joined with its parent location.
#[derive(Debug, Clone)]
pub struct StopDetails {
    pub name: String,
    pub address: Option<String>,
    pub location_name: Option<String>,
}

impl StopDetails {
    fn label(&self) -> String {
        match self.address.as_deref() {
            Some(address) if !address.is_empty() => format!("{}, {}", self.name, address),
            _ => self.name.clone(),
        }
    }
}

/// A booking joined with its seat, trip, vehicle and stops, as stored.
#[derive(Debug, Clone)]
pub struct BookingDetails {
    pub ticket_number: String,
    pub status: BookingStatus,
    pub booking_time: DateTime<Utc>,
    pub note: Option<String>,
    pub seat_number: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub license_plate: Option<String>,
    pub sub_origin: StopDetails,
    pub sub_destination: StopDetails,
}

/// Customer-facing booking representation with the derived status applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub ticket_number: String,
    pub seat_number: String,
    pub booking_time: DateTime<Utc>,
    pub origin: String,
    pub sub_origin: String,
    pub destination: String,
    pub sub_destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub license_plate: String,
    pub note: Option<String>,
    pub status: BookingStatus,
}

impl BookingView {
    pub fn from_details(details: BookingDetails, now: DateTime<Utc>) -> Self {
        let status = details.status.effective(details.arrival_time, now);
        Self {
            origin: details
                .sub_origin
                .location_name
                .clone()
                .unwrap_or_else(|| "Unknown Origin".to_string()),
            sub_origin: details.sub_origin.label(),
            destination: details
                .sub_destination
                .location_name
                .clone()
                .unwrap_or_else(|| "Unknown Destination".to_string()),
            sub_destination: details.sub_destination.label(),
            license_plate: details.license_plate.unwrap_or_else(|| "Unknown".to_string()),
            ticket_number: details.ticket_number,
            seat_number: details.seat_number,
            booking_time: details.booking_time,
            departure_time: details.departure_time,
            arrival_time: details.arrival_time,
            note: details.note,
            status,
        }
    }
}

/// Booked seats of one trip against its capacity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeatMap {
    pub trip_id: Uuid,
    pub capacity: u32,
    pub available: u32,
    pub seat_numbers: Vec<String>,
}
