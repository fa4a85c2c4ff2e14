//! Service layer for KindleHarvest business logic.
//!
//! This module contains domain logic separated from UI concerns.
//! Services can be used by the CLI or other interfaces.

pub mod harvest;

pub use harvest::{plan_run, HarvestEvent, HarvestService, RunPlan};
