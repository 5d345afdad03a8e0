use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::interval::DateRange;

/// One historical record of a person heading a unit over an interval.
///
/// Assignments are the authoritative manager history; the unit's convenience
/// `manager` pointer is only a cache reconciled into this ledger. A record's
/// start date is always known; a missing end date means the assignment is
/// still open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Stable identifier of this record.
    pub id: Uuid,
    /// The unit being headed.
    pub unit: Uuid,
    /// The person heading it.
    pub person: Uuid,
    /// First day of the assignment, inclusive.
    pub from: NaiveDate,
    /// Last day of the assignment, inclusive. `None` while open.
    pub to: Option<NaiveDate>,
}

impl Assignment {
    /// Open a new assignment starting on `from` with no end date.
    #[must_use]
    pub fn open(unit: Uuid, person: Uuid, from: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            unit,
            person,
            from,
            to: None,
        }
    }

    /// The record's validity as a [`DateRange`]: the start is always set,
    /// the end stays open while the assignment is current.
    #[must_use]
    pub const fn interval(&self) -> DateRange {
        DateRange {
            from: Some(self.from),
            to: self.to,
        }
    }

    /// Whether the record's interval is well-formed (`to >= from` when
    /// closed).
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.interval().is_valid()
    }

    /// Whether `date` falls inside this assignment's interval, treating a
    /// missing end as unbounded future.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.interval().contains(date)
    }

    /// Whether this record's interval shares at least one day with another.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.interval().overlaps(&other.interval())
    }
}
