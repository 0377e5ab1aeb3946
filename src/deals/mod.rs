//! Deal lifecycle and stage workflow
//!
//! - `models`: deal graph entities and their wire format
//! - `repository`: store operations and required-field checks
//! - `seeder`: canonical stage set written at deal creation
//! - `checklist`: checklist updates and stage completion
//! - `access`: who may do what on a deal
//! - `service`: facade used by the HTTP routes

pub mod access;
pub mod checklist;
pub mod models;
pub mod outcome;
pub mod repository;
pub mod seeder;
pub mod service;

pub use access::{AccessPolicy, DealAction, UserContext};
pub use checklist::ChecklistEngine;
pub use models::{
    ChecklistItem, CreateDealInput, Deal, DealDocument, DealGraph, DocumentInput, EntrySource,
    Participant, ParticipantInput, Stage, StageStatus, StageUpdate,
};
pub use outcome::{Outcome, Warning};
pub use repository::DealRepository;
pub use seeder::{SeedResult, StageSeeder, STAGE_ORDER};
pub use service::DealService;
