pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod memory;
pub mod redis_repo;

pub use booking_repo::PgBookingStore;
pub use database::DbClient;
pub use memory::{MemorySessionStore, MemoryStore, SeededTrip};
pub use redis_repo::RedisClient;
