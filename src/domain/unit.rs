use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{code::UnitCode, interval::DateRange};

/// An organizational unit ("struttura"): one node in the hierarchy.
///
/// The `code` is computed, never chosen: it is assigned by the chart on first
/// save and recomputed whenever the unit is reparented. The `manager` field
/// is a convenience pointer to "who should be running this going forward";
/// the assignment ledger, not this field, is the source of truth for
/// historical queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Stable identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Reference to the unit's [`Level`](super::level::Level).
    pub level: Uuid,
    /// Parent unit, or `None` for a root.
    pub parent: Option<Uuid>,
    /// Hierarchical code; `None` until first saved into a chart.
    pub code: Option<UnitCode>,
    /// The unit's own validity window.
    pub validity: DateRange,
    /// Convenience pointer to the current manager. Reconciled into the
    /// ledger on save; never read directly for historical queries.
    pub manager: Option<Uuid>,
    /// Organizational decree number, if assigned.
    pub ode_number: Option<u32>,
    /// Engineering registry number, if assigned.
    pub eng_number: Option<u32>,
    /// Public web page, if any.
    pub url: Option<String>,
}

impl Unit {
    /// Create a unit valid from `from`, open-ended, with no code yet.
    #[must_use]
    pub fn new(name: impl Into<String>, level: Uuid, from: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            level,
            parent: None,
            code: None,
            validity: DateRange::since(from),
            manager: None,
            ode_number: None,
            eng_number: None,
            url: None,
        }
    }

    /// Builder-style parent setter.
    #[must_use]
    pub const fn with_parent(mut self, parent: Uuid) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Builder-style manager setter.
    #[must_use]
    pub const fn with_manager(mut self, manager: Uuid) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Whether the unit exists on `date` according to its validity window.
    #[must_use]
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.validity.contains(date)
    }
}
