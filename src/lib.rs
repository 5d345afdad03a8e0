//! Plain-text Organizational Chart Management
//!
//! Units, levels and people are YAML documents stored in a directory. The
//! chart tracks who headed which unit over time and can materialize the
//! hierarchy as it stood on any date.

pub mod domain;
pub use domain::{Chart, Config, DateRange, SaveError, Unit, UnitCode, ValidationError};

/// Filesystem storage and directory management for chart records.
pub mod storage;
pub use storage::Directory;
