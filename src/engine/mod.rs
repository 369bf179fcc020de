//! Execution engine for steward
//!
//! The engine orchestrates:
//! 1. Previewing - a dry run evaluates guards and read-only checks
//! 2. Diffing - the preview's drift is shown grouped by kind
//! 3. Executing - after confirmation the run list converges for real

pub mod differ;
pub mod executor;

pub use executor::{EngineOptions, Execution, execute};
