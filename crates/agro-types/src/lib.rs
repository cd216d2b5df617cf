//! Shared types for the agro metadata control plane: status codes, the
//! `Status` error value, the crate-wide `Result` alias and strongly typed
//! identifiers.

#[allow(non_snake_case)]
pub mod status_code;

pub mod result;
pub mod status;

#[macro_use]
pub mod strong_type;

pub mod ids;

// Re-export commonly used items at the crate root.
pub use ids::*;
pub use result::{make_error, make_error_msg, Result};
pub use status::{ErrorKind, Status};
pub use status_code::*;
