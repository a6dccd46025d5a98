use axum::{
    extract::{rejection::PathRejection, Path, State},
    routing::get,
    Json, Router,
};
use limo_core::SeatMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::response::ApiResponse;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/trip/{trip_id}/booked-seats", get(booked_seats))
}

async fn booked_seats(
    State(state): State<AppState>,
    trip_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<SeatMap>>, AppError> {
    let Path(trip_id) = trip_id.map_err(|_| AppError::NotFoundError("Trip not found".to_string()))?;
    let seat_map = state.bookings.seat_map(trip_id).await?;
    Ok(Json(ApiResponse::ok("Booked seats retrieved", seat_map)))
}
