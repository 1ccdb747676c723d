//! Persistence layer for the signal validation pipeline.
//!
//! This crate provides:
//! - The `PostgreSQL` client and idempotent schema
//! - Record types for all six persisted tables
//! - Typed repositories with find/insert/upsert operations

pub mod database;
pub mod models;
pub mod repositories;
pub mod seed;

pub use database::DatabaseClient;
pub use seed::{import_seed_file, parse_seed_file, SeedFile, SeedReport};
pub use models::{
    ConfidenceAdjustmentRecord, CrossTfComboRecord, FactCheckRecord, LiveSignalRecord,
    SignalDefinitionRecord, TfComboRecord,
};
pub use repositories::{
    ComboRepository, ConfidenceRepository, FactCheckRepository, LiveSignalRepository,
    Repositories, SignalDefinitionRepository,
};
