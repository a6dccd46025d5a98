use async_trait::async_trait;
use chrono::{DateTime, Utc};
use limo_core::repository::{BookingStore, BookingUnitOfWork};
use limo_core::{
    Booking, BookingDetails, BookingStatus, Contact, LockedBooking, NewBooking, Profile, Seat,
    StopDetails, StoreError, Trip,
};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

const TRIP_COLUMNS: &str = "id, departure_time, arrival_time, vehicle_class, price, status, \
     vehicle_id, origin_location_id, destination_location_id";

const PROFILE_COLUMNS: &str = "id, full_name, phone_number, email, created_at";

const BOOKING_DETAILS_SELECT: &str = r#"
    SELECT
        b.ticket_number, b.status, b.booking_time, b.note,
        s.seat_number,
        t.departure_time, t.arrival_time,
        v.license_plate,
        so.name AS sub_origin_name, so.address AS sub_origin_address, lo.name AS origin_name,
        sd.name AS sub_destination_name, sd.address AS sub_destination_address, ld.name AS destination_name
    FROM booking b
    JOIN seat s ON s.id = b.seat_id
    JOIN trip t ON t.id = s.trip_id
    LEFT JOIN vehicle v ON v.id = t.vehicle_id
    JOIN sub_location so ON so.id = b.sub_origin_id
    LEFT JOIN location lo ON lo.id = so.location_id
    JOIN sub_location sd ON sd.id = b.sub_destination_id
    LEFT JOIN location ld ON ld.id = sd.location_id
"#;

fn db_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_foreign_key_violation() {
            return StoreError::MissingReference(db_err.message().to_string());
        }
    }
    StoreError::Database(err.to_string())
}

fn corrupt(err: impl std::fmt::Display) -> StoreError {
    StoreError::Database(format!("Invalid stored value: {}", err))
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    vehicle_class: String,
    price: i64,
    status: String,
    vehicle_id: Uuid,
    origin_location_id: Uuid,
    destination_location_id: Uuid,
}

impl TryFrom<TripRow> for Trip {
    type Error = StoreError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        Ok(Trip {
            id: row.id,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            vehicle_class: row.vehicle_class.parse().map_err(corrupt)?,
            price: row.price,
            status: row.status.parse().map_err(corrupt)?,
            vehicle_id: row.vehicle_id,
            origin_location_id: row.origin_location_id,
            destination_location_id: row.destination_location_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    full_name: String,
    phone_number: String,
    email: String,
    created_at: DateTime<Utc>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            id: row.id,
            full_name: row.full_name,
            phone_number: row.phone_number,
            email: row.email,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    ticket_number: String,
    status: String,
    booking_time: DateTime<Utc>,
    note: Option<String>,
    seat_id: Uuid,
    profile_id: Uuid,
    sub_origin_id: Uuid,
    sub_destination_id: Uuid,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            ticket_number: row.ticket_number,
            status: row.status.parse().map_err(corrupt)?,
            booking_time: row.booking_time,
            note: row.note,
            seat_id: row.seat_id,
            profile_id: row.profile_id,
            sub_origin_id: row.sub_origin_id,
            sub_destination_id: row.sub_destination_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingDetailsRow {
    ticket_number: String,
    status: String,
    booking_time: DateTime<Utc>,
    note: Option<String>,
    seat_number: String,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    license_plate: Option<String>,
    sub_origin_name: String,
    sub_origin_address: Option<String>,
    origin_name: Option<String>,
    sub_destination_name: String,
    sub_destination_address: Option<String>,
    destination_name: Option<String>,
}

impl TryFrom<BookingDetailsRow> for BookingDetails {
    type Error = StoreError;

    fn try_from(row: BookingDetailsRow) -> Result<Self, Self::Error> {
        Ok(BookingDetails {
            ticket_number: row.ticket_number,
            status: row.status.parse().map_err(corrupt)?,
            booking_time: row.booking_time,
            note: row.note,
            seat_number: row.seat_number,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            license_plate: row.license_plate,
            sub_origin: StopDetails {
                name: row.sub_origin_name,
                address: row.sub_origin_address,
                location_name: row.origin_name,
            },
            sub_destination: StopDetails {
                name: row.sub_destination_name,
                address: row.sub_destination_address,
                location_name: row.destination_name,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
struct LockedBookingRow {
    booking_id: Uuid,
    ticket_number: String,
    status: String,
    trip_arrival_time: DateTime<Utc>,
}

/// Postgres-backed booking persistence.
#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn begin(&self) -> Result<Box<dyn BookingUnitOfWork>, StoreError> {
        let tx = self.pool.begin().await.map_err(db_error)?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn find_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StoreError> {
        let sql = format!("SELECT {} FROM trip WHERE id = $1", TRIP_COLUMNS);
        sqlx::query_as::<_, TripRow>(&sql)
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(Trip::try_from)
            .transpose()
    }

    async fn booked_seat_numbers(&self, trip_id: Uuid) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar::<_, String>(
            "SELECT seat_number FROM seat WHERE trip_id = $1 ORDER BY seat_number",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn find_profile(&self, profile_id: Uuid) -> Result<Option<Profile>, StoreError> {
        let sql = format!("SELECT {} FROM profile WHERE id = $1", PROFILE_COLUMNS);
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(profile_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.map(Profile::from))
    }

    async fn find_profiles_by_email(&self, email: &str) -> Result<Vec<Profile>, StoreError> {
        let sql = format!(
            "SELECT {} FROM profile WHERE email = $1 ORDER BY created_at, id",
            PROFILE_COLUMNS
        );
        let rows = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(email)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(Profile::from).collect())
    }

    async fn find_booking_details(
        &self,
        ticket_number: &str,
    ) -> Result<Option<BookingDetails>, StoreError> {
        let sql = format!("{} WHERE b.ticket_number = $1", BOOKING_DETAILS_SELECT);
        sqlx::query_as::<_, BookingDetailsRow>(&sql)
            .bind(ticket_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(BookingDetails::try_from)
            .transpose()
    }

    async fn list_booking_details(
        &self,
        profile_ids: &[Uuid],
    ) -> Result<Vec<BookingDetails>, StoreError> {
        if profile_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "{} WHERE b.profile_id = ANY($1) ORDER BY b.booking_time, b.id",
            BOOKING_DETAILS_SELECT
        );
        sqlx::query_as::<_, BookingDetailsRow>(&sql)
            .bind(profile_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?
            .into_iter()
            .map(BookingDetails::try_from)
            .collect()
    }
}

/// One Postgres transaction. Dropping it un-committed rolls it back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BookingUnitOfWork for PgUnitOfWork {
    async fn find_trip(&mut self, trip_id: Uuid) -> Result<Option<Trip>, StoreError> {
        // Exclusive row lock: reservations on one trip run one after another,
        // so the seat count and the seat inserts cannot interleave.
        let sql = format!("SELECT {} FROM trip WHERE id = $1 FOR UPDATE", TRIP_COLUMNS);
        sqlx::query_as::<_, TripRow>(&sql)
            .bind(trip_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?
            .map(Trip::try_from)
            .transpose()
    }

    async fn find_profile_by_email(&mut self, email: &str) -> Result<Option<Profile>, StoreError> {
        // Held until commit/rollback: a concurrent first booking for the same
        // email waits here and then finds the profile created by this one.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(email)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;

        let sql = format!(
            "SELECT {} FROM profile WHERE email = $1 ORDER BY created_at, id LIMIT 1",
            PROFILE_COLUMNS
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;
        Ok(row.map(Profile::from))
    }

    async fn create_profile(&mut self, contact: &Contact) -> Result<Profile, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO profile (id, full_name, phone_number, email)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&contact.full_name)
            .bind(&contact.phone_number)
            .bind(&contact.email)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_error)?;
        Ok(row.into())
    }

    async fn count_seats(&mut self, trip_id: Uuid) -> Result<u32, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM seat WHERE trip_id = $1")
            .bind(trip_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_error)?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn seat_exists(&mut self, trip_id: Uuid, seat_number: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM seat WHERE trip_id = $1 AND seat_number = $2)",
        )
        .bind(trip_id)
        .bind(seat_number)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)
    }

    async fn insert_seat(
        &mut self,
        trip_id: Uuid,
        seat_number: &str,
    ) -> Result<Option<Seat>, StoreError> {
        // The unique index is the authority: a concurrent claim blocks here
        // until the other transaction ends, then yields no row.
        let row: Option<(Uuid, Uuid, String)> = sqlx::query_as(
            r#"
            INSERT INTO seat (id, trip_id, seat_number)
            VALUES ($1, $2, $3)
            ON CONFLICT (trip_id, seat_number) DO NOTHING
            RETURNING id, trip_id, seat_number
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(trip_id)
        .bind(seat_number)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(row.map(|(id, trip_id, seat_number)| Seat { id, trip_id, seat_number }))
    }

    async fn ticket_number_exists(&mut self, ticket_number: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM booking WHERE ticket_number = $1)",
        )
        .bind(ticket_number)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)
    }

    async fn insert_booking(&mut self, booking: &NewBooking) -> Result<Option<Booking>, StoreError> {
        sqlx::query_as::<_, BookingRow>(
            r#"
            INSERT INTO booking (id, ticket_number, status, note, seat_id, profile_id, sub_origin_id, sub_destination_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (ticket_number) DO NOTHING
            RETURNING id, ticket_number, status, booking_time, note, seat_id, profile_id, sub_origin_id, sub_destination_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&booking.ticket_number)
        .bind(booking.status.as_str())
        .bind(&booking.note)
        .bind(booking.seat_id)
        .bind(booking.profile_id)
        .bind(booking.sub_origin_id)
        .bind(booking.sub_destination_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?
        .map(Booking::try_from)
        .transpose()
    }

    async fn lock_booking(&mut self, ticket_number: &str) -> Result<Option<LockedBooking>, StoreError> {
        let row = sqlx::query_as::<_, LockedBookingRow>(
            r#"
            SELECT b.id AS booking_id, b.ticket_number, b.status, t.arrival_time AS trip_arrival_time
            FROM booking b
            JOIN seat s ON s.id = b.seat_id
            JOIN trip t ON t.id = s.trip_id
            WHERE b.ticket_number = $1
            FOR UPDATE OF b
            "#,
        )
        .bind(ticket_number)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        match row {
            Some(row) => Ok(Some(LockedBooking {
                booking_id: row.booking_id,
                ticket_number: row.ticket_number,
                status: row.status.parse().map_err(corrupt)?,
                trip_arrival_time: row.trip_arrival_time,
            })),
            None => Ok(None),
        }
    }

    async fn update_booking_status(
        &mut self,
        booking_id: Uuid,
        status: BookingStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE booking SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(booking_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let uow = *self;
        uow.tx.commit().await.map_err(db_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let uow = *self;
        uow.tx.rollback().await.map_err(db_error)
    }
}
