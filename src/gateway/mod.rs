//! Request orchestration: context, resilience, outcome.

mod orchestrator;
mod outcome;

pub use orchestrator::*;
pub use outcome::*;
