//! Resilience controls around provider calls.

mod breaker;
mod retry;

pub use breaker::*;
pub use retry::*;
