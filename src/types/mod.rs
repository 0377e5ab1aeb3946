//! Shared types for Dealroom

pub mod error;

pub use error::{DealError, Result, StoreError};
