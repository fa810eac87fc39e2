//! Provider adapters and the HTTP client that drives them.

mod adapter;
mod client;

pub use adapter::*;
pub use client::*;
