pub mod lookup;
pub mod query;
pub mod reservation;
pub mod ticket;

pub use query::{BookingQueryService, Cancellation};
pub use reservation::{ReservationEngine, ReservationPolicy, ReservationReceipt, ReservationRequest};
pub use ticket::{is_ticket_number, RandomTicketNumbers, TicketNumberSource};
