//! Conversation sessions: history, prompt flattening and persistence.

mod history;
mod store;

pub use history::*;
pub use store::*;
