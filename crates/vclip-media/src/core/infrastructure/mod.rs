//! Infrastructure helpers shared by callers of external services.

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
