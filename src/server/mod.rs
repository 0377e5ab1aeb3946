//! HTTP server

pub mod http;

pub use http::{dispatch, run, AppState, MAX_BODY_BYTES};
