//! Shared types for the console client workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
