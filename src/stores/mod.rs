//! Concrete store implementations.
//!
//! Redis and PostgreSQL back the multi-worker deployment; the in-memory
//! variants back the single-process mode and the test suite.

mod orders_memory;
mod orders_postgres;
mod rate_limiter_memory;
mod rate_limiter_redis;
mod session_memory;
mod session_redis;

pub use orders_memory::MemoryOrderStore;
pub use orders_postgres::PostgresOrderStore;
pub use rate_limiter_memory::MemoryRateLimiter;
pub use rate_limiter_redis::RedisRateLimiter;
pub use session_memory::MemorySessionStore;
pub use session_redis::RedisSessionStore;
