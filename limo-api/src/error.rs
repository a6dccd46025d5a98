use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use limo_core::{BookingError, StoreError};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    RateLimited,
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::RateLimited => {
                (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded".to_string())
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "success": false,
            "message": message,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::NotFound(_) => AppError::NotFoundError(err.to_string()),
            BookingError::SeatAlreadyBooked(_)
            | BookingError::TripFull { .. }
            | BookingError::Validation(_) => AppError::ValidationError(err.to_string()),
            BookingError::InvalidTransition { .. } => AppError::ConflictError(err.to_string()),
            // Unknown pickup or drop-off point.
            BookingError::Storage(StoreError::MissingReference(_)) => {
                AppError::ValidationError(err.to_string())
            }
            BookingError::TicketNumberExhausted(_) | BookingError::Storage(_) => {
                AppError::InternalServerError(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use limo_core::BookingStatus;

    fn status_of(err: BookingError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_booking_error_status_mapping() {
        assert_eq!(status_of(BookingError::NotFound("Trip")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(BookingError::SeatAlreadyBooked("A1".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(BookingError::TripFull { capacity: 20, available: 0, requested: 1 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(BookingError::InvalidTransition {
                from: BookingStatus::Cancelled,
                to: BookingStatus::Cancelled,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(BookingError::TicketNumberExhausted(10)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(StoreError::Database("boom".to_string()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(StoreError::MissingReference("sub_location".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
    }
}
