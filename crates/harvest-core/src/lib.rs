#![deny(warnings)]

//! Core domain models and invariants for Harvest Planner.
//! This crate defines the crop economics, the per-day farm calendar, the
//! canonical text serialization shared by the cache and the worker pool,
//! and the engine configuration surface.

pub mod calendar;
pub mod crop;
pub mod error;
pub mod options;
pub mod wire;

pub use calendar::{Calendar, DayState, PlantBatch, Tiles};
pub use crop::{Crop, CropCatalog};
pub use error::PlanError;
pub use options::{PlannerOptions, TileReleasePolicy};

/// Day index within a season. Day 1 is the first plantable day; day
/// `season_len + 1` exists only to receive the last payday.
pub type Day = u16;
