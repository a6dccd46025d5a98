use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use limo_booking::{is_ticket_number, Cancellation, ReservationRequest};
use limo_core::{BookingView, Contact};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::{customer_auth_middleware, CustomerClaims};
use crate::response::ApiResponse;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub full_name: String,
    pub phone_number: String,
    pub email: String,
    pub note: Option<String>,
    pub seat_numbers: Vec<String>,
    pub trip_id: Uuid,
    pub sub_origin_id: Uuid,
    pub sub_destination_id: Uuid,
}

impl From<CreateBookingRequest> for ReservationRequest {
    fn from(req: CreateBookingRequest) -> Self {
        ReservationRequest {
            trip_id: req.trip_id,
            contact: Contact {
                full_name: req.full_name,
                phone_number: req.phone_number,
                email: req.email,
            },
            seat_numbers: req.seat_numbers,
            note: req.note,
            sub_origin_id: req.sub_origin_id,
            sub_destination_id: req.sub_destination_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreated {
    pub total_ticket: usize,
    pub ticket_numbers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub email: String,
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes(state: AppState) -> Router<AppState> {
    let authenticated = Router::new()
        .route("/api/booking/list", get(list_my_bookings))
        .route_layer(middleware::from_fn_with_state(state, customer_auth_middleware));

    Router::new()
        .route("/api/booking", post(create_booking))
        .route("/api/booking/search", get(search_bookings))
        .route(
            "/api/booking/{ticket_number}",
            get(get_booking).patch(cancel_booking),
        )
        .merge(authenticated)
}

// ============================================================================
// Handlers
// ============================================================================

async fn create_booking(
    State(state): State<AppState>,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<BookingCreated>>), AppError> {
    let Json(req) = payload?;
    let receipt = state.reservations.reserve(req.into()).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "Booking created successfully",
            BookingCreated {
                total_ticket: receipt.total_tickets(),
                ticket_numbers: receipt.ticket_numbers,
            },
        )),
    ))
}

async fn search_bookings(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<BookingView>>>, AppError> {
    let Query(query) = query?;
    let email = query.email.trim();
    if email.is_empty() {
        return Err(AppError::ValidationError("email is required".to_string()));
    }

    let bookings = state.bookings.search_by_email(email).await?;
    Ok(Json(ApiResponse::ok("Bookings retrieved", bookings)))
}

async fn list_my_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
) -> Result<Json<ApiResponse<Vec<BookingView>>>, AppError> {
    let bookings = state.bookings.list_by_profile(claims.profile_id).await?;
    Ok(Json(ApiResponse::ok("Bookings retrieved", bookings)))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(ticket_number): Path<String>,
) -> Result<Json<ApiResponse<BookingView>>, AppError> {
    if !is_ticket_number(&ticket_number) {
        return Err(AppError::NotFoundError("Booking not found".to_string()));
    }
    let booking = state.bookings.get_by_ticket_number(&ticket_number).await?;
    Ok(Json(ApiResponse::ok("Booking retrieved", booking)))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(ticket_number): Path<String>,
) -> Result<Json<ApiResponse<Cancellation>>, AppError> {
    if !is_ticket_number(&ticket_number) {
        return Err(AppError::NotFoundError("Booking not found".to_string()));
    }
    let cancellation = state.bookings.cancel(&ticket_number).await?;
    Ok(Json(ApiResponse::ok("Booking cancelled", cancellation)))
}
