//! Versioned on-disk record formats.
//!
//! Each record type carries a `_version` tag so the file format can evolve
//! without breaking existing stores. Records are pure data: conversion to and
//! from the domain types lives here, invariants live in the domain.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    Assignment, DateRange, Level, Person, Qualification, Unit, UnitCode,
};

/// On-disk form of a [`Level`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_version")]
pub enum LevelRecord {
    /// Initial format.
    #[serde(rename = "1")]
    V1 {
        /// Stable identifier.
        id: Uuid,
        /// Display name.
        name: String,
        /// Optional free-text description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        /// Hierarchy position, 0 is the apex.
        order: u32,
        /// Whether units of this level may be roots.
        #[serde(default)]
        can_be_root: bool,
        /// Explicit admissible-parent whitelist; empty means the order rule.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        allowed_parents: Vec<Uuid>,
    },
}

impl From<Level> for LevelRecord {
    fn from(level: Level) -> Self {
        Self::V1 {
            id: level.id,
            name: level.name,
            description: level.description,
            order: level.order,
            can_be_root: level.can_be_root,
            allowed_parents: level.allowed_parents.into_iter().collect(),
        }
    }
}

impl From<LevelRecord> for Level {
    fn from(record: LevelRecord) -> Self {
        match record {
            LevelRecord::V1 {
                id,
                name,
                description,
                order,
                can_be_root,
                allowed_parents,
            } => Self {
                id,
                name,
                description,
                order,
                can_be_root,
                allowed_parents: allowed_parents.into_iter().collect(),
            },
        }
    }
}

/// On-disk form of a [`Qualification`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_version")]
pub enum QualificationRecord {
    /// Initial format.
    #[serde(rename = "1")]
    V1 {
        /// Stable identifier.
        id: Uuid,
        /// Display title.
        title: String,
        /// Whether the qualification carries executive rank.
        #[serde(default)]
        executive: bool,
    },
}

impl From<Qualification> for QualificationRecord {
    fn from(qualification: Qualification) -> Self {
        Self::V1 {
            id: qualification.id,
            title: qualification.title,
            executive: qualification.executive,
        }
    }
}

impl From<QualificationRecord> for Qualification {
    fn from(record: QualificationRecord) -> Self {
        match record {
            QualificationRecord::V1 {
                id,
                title,
                executive,
            } => Self {
                id,
                title,
                executive,
            },
        }
    }
}

/// On-disk form of a [`Person`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_version")]
pub enum PersonRecord {
    /// Initial format.
    #[serde(rename = "1")]
    V1 {
        /// Stable identifier.
        id: Uuid,
        /// Given name.
        first_name: String,
        /// Family name.
        last_name: String,
        /// Italian fiscal code, if known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fiscal_code: Option<String>,
        /// Contact email, if known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
        /// Reference to a qualification record, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qualification: Option<Uuid>,
        /// First day of employment, if known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        employed_from: Option<NaiveDate>,
        /// Last day of employment, if ended.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        employed_to: Option<NaiveDate>,
    },
}

impl From<Person> for PersonRecord {
    fn from(person: Person) -> Self {
        Self::V1 {
            id: person.id,
            first_name: person.first_name,
            last_name: person.last_name,
            fiscal_code: person.fiscal_code,
            email: person.email,
            qualification: person.qualification,
            employed_from: person.employment.from,
            employed_to: person.employment.to,
        }
    }
}

impl From<PersonRecord> for Person {
    fn from(record: PersonRecord) -> Self {
        match record {
            PersonRecord::V1 {
                id,
                first_name,
                last_name,
                fiscal_code,
                email,
                qualification,
                employed_from,
                employed_to,
            } => Self {
                id,
                first_name,
                last_name,
                fiscal_code,
                email,
                qualification,
                employment: DateRange {
                    from: employed_from,
                    to: employed_to,
                },
            },
        }
    }
}

/// One entry of a unit's embedded assignment history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    /// Stable identifier of the history entry.
    pub id: Uuid,
    /// The person who headed the unit.
    pub person: Uuid,
    /// First day, inclusive.
    pub from: NaiveDate,
    /// Last day, inclusive. Absent while the assignment is open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

impl AssignmentRecord {
    /// Rebuild the domain assignment for `unit` from this entry.
    #[must_use]
    pub const fn into_assignment(self, unit: Uuid) -> Assignment {
        Assignment {
            id: self.id,
            unit,
            person: self.person,
            from: self.from,
            to: self.to,
        }
    }
}

impl From<Assignment> for AssignmentRecord {
    fn from(assignment: Assignment) -> Self {
        Self {
            id: assignment.id,
            person: assignment.person,
            from: assignment.from,
            to: assignment.to,
        }
    }
}

/// On-disk form of a [`Unit`], with its assignment history embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_version")]
pub enum UnitRecord {
    /// Initial format.
    #[serde(rename = "1")]
    V1 {
        /// Stable identifier.
        id: Uuid,
        /// Display name.
        name: String,
        /// Reference to a level record.
        level: Uuid,
        /// Parent unit id, absent for roots.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<Uuid>,
        /// Assigned hierarchical code.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<UnitCode>,
        /// First day of the unit's existence, if known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        valid_from: Option<NaiveDate>,
        /// Last day of the unit's existence, if suppressed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        valid_to: Option<NaiveDate>,
        /// Convenience pointer to the current manager.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        manager: Option<Uuid>,
        /// Organizational decree number, if assigned.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ode_number: Option<u32>,
        /// Engineering registry number, if assigned.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        eng_number: Option<u32>,
        /// Public web page, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// Manager history, chronological.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        assignments: Vec<AssignmentRecord>,
    },
}

impl UnitRecord {
    /// Build a record from a unit and its history.
    #[must_use]
    pub fn new(unit: Unit, history: &[Assignment]) -> Self {
        Self::V1 {
            id: unit.id,
            name: unit.name,
            level: unit.level,
            parent: unit.parent,
            code: unit.code,
            valid_from: unit.validity.from,
            valid_to: unit.validity.to,
            manager: unit.manager,
            ode_number: unit.ode_number,
            eng_number: unit.eng_number,
            url: unit.url,
            assignments: history.iter().cloned().map(Into::into).collect(),
        }
    }

    /// Split the record into the domain unit and its history entries.
    #[must_use]
    pub fn into_parts(self) -> (Unit, Vec<Assignment>) {
        match self {
            Self::V1 {
                id,
                name,
                level,
                parent,
                code,
                valid_from,
                valid_to,
                manager,
                ode_number,
                eng_number,
                url,
                assignments,
            } => {
                let unit = Unit {
                    id,
                    name,
                    level,
                    parent,
                    code,
                    validity: DateRange {
                        from: valid_from,
                        to: valid_to,
                    },
                    manager,
                    ode_number,
                    eng_number,
                    url,
                };
                let history = assignments
                    .into_iter()
                    .map(|record| record.into_assignment(id))
                    .collect();
                (unit, history)
            }
        }
    }
}
