use limo_booking::{BookingQueryService, ReservationEngine, ReservationPolicy};
use limo_core::repository::{BookingStore, SessionStore};
use limo_store::app_config::{BookingRules, RateLimitConfig};
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub reservations: Arc<ReservationEngine>,
    pub bookings: Arc<BookingQueryService>,
    pub sessions: Arc<dyn SessionStore>,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BookingStore>,
        sessions: Arc<dyn SessionStore>,
        auth: AuthConfig,
        rules: &BookingRules,
        rate_limit: RateLimitConfig,
    ) -> Self {
        let policy = ReservationPolicy {
            ticket_number_attempts: rules.ticket_number_attempts,
        };
        Self {
            reservations: Arc::new(ReservationEngine::new(store.clone(), policy)),
            bookings: Arc::new(BookingQueryService::new(store)),
            sessions,
            auth,
            rate_limit,
        }
    }
}
