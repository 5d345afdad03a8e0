use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An inclusive, optionally open-ended interval of calendar dates.
///
/// `None` bounds are unbounded: a missing `from` means "valid since forever",
/// a missing `to` means "still active". Both units and people carry one of
/// these as their validity window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day of validity, inclusive. `None` is unbounded past.
    pub from: Option<NaiveDate>,
    /// Last day of validity, inclusive. `None` is open-ended.
    pub to: Option<NaiveDate>,
}

impl DateRange {
    /// An interval with both bounds set.
    #[must_use]
    pub const fn closed(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// An interval starting on `from` with no end.
    #[must_use]
    pub const fn since(from: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    /// Whether the interval is well-formed: when both bounds are set, the end
    /// must not precede the start.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match (self.from, self.to) {
            (Some(from), Some(to)) => to >= from,
            _ => true,
        }
    }

    /// Whether `date` falls inside the interval, treating missing bounds as
    /// unbounded.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| from <= date) && self.to.is_none_or(|to| to >= date)
    }

    /// Whether two intervals share at least one day.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let starts_before_other_ends = match (self.from, other.to) {
            (Some(from), Some(to)) => from <= to,
            _ => true,
        };
        let other_starts_before_end = match (other.from, self.to) {
            (Some(from), Some(to)) => from <= to,
            _ => true,
        };
        starts_before_other_ends && other_starts_before_end
    }
}
