//! Promptgate - resilient command-line gateway to text-generation providers.

pub mod config;
pub mod display;
pub mod error;
pub mod gateway;
pub mod provider;
pub mod resilience;
pub mod session;

pub use error::{ErrorKind, GatewayError};
