//! Shared error and result types.

pub mod error;

pub use error::{Error, ResourceKind, Result};
