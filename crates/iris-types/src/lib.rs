//! Shared domain types for the Iris capture client.

pub mod config;
pub mod events;
pub mod frame;
pub mod protocol;
pub mod session;

mod errors;

pub use errors::{IrisError, Result};
