//! Dealroom - deal lifecycle and stage workflow backend
//!
//! Tracks real-estate deals from intake to post-close. Each deal carries a
//! fixed ladder of stages with checklists, a participant roster and attached
//! documents. Stages promote to completed once their required checklist
//! items are done, and the deal header mirrors that status.
//!
//! ## Layout
//!
//! - `db`: document store abstraction with MongoDB and in-memory backends
//! - `deals`: models, seeding, checklist engine, repository, access policy
//! - `listings`: external listings provider adapters
//! - `auth`: bearer token and dev-mode identity
//! - `routes` / `server`: the HTTP API

pub mod auth;
pub mod config;
pub mod db;
pub mod deals;
pub mod listings;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use deals::{DealService, UserContext};
pub use server::{run, AppState};
pub use types::{DealError, Result, StoreError};
