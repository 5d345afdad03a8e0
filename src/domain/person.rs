use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::interval::DateRange;

/// A professional qualification, referenced by people.
///
/// Reference data, like [`Level`](super::level::Level).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualification {
    /// Stable identifier.
    pub id: Uuid,
    /// Display title, e.g. "Dirigente".
    pub title: String,
    /// Whether the qualification carries executive rank.
    pub executive: bool,
}

impl Qualification {
    /// Create a qualification with a fresh id.
    #[must_use]
    pub fn new(title: impl Into<String>, executive: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            executive,
        }
    }
}

/// A person who can head an organizational unit.
///
/// The employment window is the person's own active interval and is
/// independent of any unit assignment: a ledger entry only resolves to a
/// manager on dates where the person was themselves employed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Stable identifier.
    pub id: Uuid,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Italian fiscal code, if known.
    pub fiscal_code: Option<String>,
    /// Contact email, if known.
    pub email: Option<String>,
    /// Reference to a [`Qualification`], if any.
    pub qualification: Option<Uuid>,
    /// The person's own employment interval.
    pub employment: DateRange,
}

impl Person {
    /// Create a person employed from `from`, open-ended.
    #[must_use]
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>, from: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            fiscal_code: None,
            email: None,
            qualification: None,
            employment: DateRange::since(from),
        }
    }

    /// Whether the person was employed on `date`.
    #[must_use]
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.employment.contains(date)
    }

    /// "Last First" display form.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name)
    }
}

/// A read model of a manager resolved on a specific date, with the
/// qualification title already joined in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonSnapshot {
    /// The person's stable identifier.
    pub id: Uuid,
    /// "Last First" display name.
    pub name: String,
    /// Qualification title, if the person has one.
    pub title: Option<String>,
}
