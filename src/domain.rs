//! Domain models for temporal organizational hierarchies.
//!
//! This module contains the core domain types: units and their hierarchical
//! codes, levels, people, the assignment ledger, and the chart that ties them
//! together.

mod assignment;
pub use assignment::Assignment;

/// Hierarchical unit code types and parsing.
pub mod code;
pub use code::{Error as CodeError, UnitCode};

mod chart;
pub use chart::{Chart, SaveError, SaveOutcome, UnitNode, ValidationError};

mod config;
pub use config::Config;

/// Inclusive date intervals with optional endpoints.
pub mod interval;
pub use interval::DateRange;

mod ledger;
pub use ledger::{Ledger, LedgerError, ReconcileOutcome};

mod level;
pub use level::{Level, LevelRegistry};

mod person;
pub use person::{Person, PersonSnapshot, Qualification};

mod unit;
pub use unit::Unit;
