//! The per-unit manager assignment ledger.
//!
//! The [`Ledger`] is the authoritative history of who headed which unit and
//! when. Records never overlap within a unit and are never deleted in normal
//! operation; superseded records are closed, not removed. The only writer is
//! the chart's save path, which reconciles the unit's convenience manager
//! pointer into the ledger.

use std::collections::HashMap;

use chrono::NaiveDate;
use uuid::Uuid;

use super::{assignment::Assignment, unit::Unit};

/// Errors raised by ledger mutations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    /// A record's end date precedes its start date.
    #[error("assignment interval ends before it starts")]
    InvalidInterval,

    /// Inserting the record would violate the per-unit non-overlap
    /// invariant. Reconciliation closes the current record before opening a
    /// new one, so this is a defensive boundary check; it can fire for
    /// back-dated changes where the clamped close date still covers the new
    /// start.
    #[error("overlapping assignment for unit {unit}")]
    OverlappingAssignment {
        /// The unit whose history would become inconsistent.
        unit: Uuid,
    },
}

/// Result of reconciling a unit's manager pointer into the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// The record that was closed (its end date set), if any.
    pub closed: Option<Uuid>,
    /// The record that was opened, if any.
    pub opened: Option<Uuid>,
}

impl ReconcileOutcome {
    /// Whether reconciliation changed nothing.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.closed.is_none() && self.opened.is_none()
    }
}

/// The assignment history of every unit, keyed by unit id.
///
/// Per-unit record vectors are kept ordered by start date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    by_unit: HashMap<Uuid, Vec<Assignment>>,
}

impl Ledger {
    /// The full history of a unit, in chronological order of start date.
    #[must_use]
    pub fn history(&self, unit: Uuid) -> &[Assignment] {
        self.by_unit.get(&unit).map_or(&[], Vec::as_slice)
    }

    /// The assignment active on `date` for `unit`, if any.
    ///
    /// If more than one record matched (impossible while the non-overlap
    /// invariant holds), the one with the latest start date wins.
    #[must_use]
    pub fn active_on(&self, unit: Uuid, date: NaiveDate) -> Option<&Assignment> {
        self.history(unit)
            .iter()
            .filter(|record| record.contains(date))
            .max_by_key(|record| record.from)
    }

    /// Insert a record, enforcing interval sanity and the per-unit
    /// non-overlap invariant.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInterval`] for an inverted interval, or
    /// [`LedgerError::OverlappingAssignment`] if the record's interval shares
    /// a day with an existing record for the same unit.
    pub fn insert(&mut self, record: Assignment) -> Result<(), LedgerError> {
        if !record.is_well_formed() {
            return Err(LedgerError::InvalidInterval);
        }

        let records = self.by_unit.entry(record.unit).or_default();
        if records.iter().any(|existing| existing.overlaps(&record)) {
            return Err(LedgerError::OverlappingAssignment { unit: record.unit });
        }

        let position = records.partition_point(|existing| existing.from <= record.from);
        records.insert(position, record);
        Ok(())
    }

    /// Reconcile the ledger with a unit's manager pointer as of
    /// `effective`.
    ///
    /// Semantics:
    ///
    /// 1. If the record active on `effective` already names `new_manager`
    ///    (or there is no active record and no new manager), nothing happens.
    /// 2. Otherwise the active record, if any, is closed on the day before
    ///    `effective`, clamped to its own start date so the interval never
    ///    inverts (a back-dated change can produce a one-day record).
    /// 3. If `new_manager` is set, a new open-ended record starts at
    ///    `max(effective, unit.validity.from)`.
    ///
    /// Re-running with the same manager and date is a no-op, so callers may
    /// safely retry after a failure.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::OverlappingAssignment`] if the new record would
    /// overlap existing history; any record closed in step 2 stays closed.
    pub fn reconcile(
        &mut self,
        unit: &Unit,
        new_manager: Option<Uuid>,
        effective: NaiveDate,
    ) -> Result<ReconcileOutcome, LedgerError> {
        let current = self
            .active_on(unit.id, effective)
            .map(|record| (record.id, record.person, record.from, record.to));

        let noop = match current {
            Some((_, person, _, _)) => new_manager == Some(person),
            None => new_manager.is_none(),
        };
        if noop {
            return Ok(ReconcileOutcome {
                closed: None,
                opened: None,
            });
        }

        let mut closed = None;
        if let Some((id, _, from, to)) = current {
            // Clamp so a change effective on the record's start date does not
            // invert the interval.
            let close_date = effective.pred_opt().map_or(from, |day| day.max(from));
            if to != Some(close_date) {
                let records = self
                    .by_unit
                    .get_mut(&unit.id)
                    .expect("unit has an active record");
                let record = records
                    .iter_mut()
                    .find(|record| record.id == id)
                    .expect("active record is present");
                record.to = Some(close_date);
                closed = Some(id);
                tracing::debug!(unit = %unit.id, record = %id, %close_date, "closed assignment");
            }
        }

        let mut opened = None;
        if let Some(person) = new_manager {
            let start = unit
                .validity
                .from
                .map_or(effective, |valid_from| effective.max(valid_from));
            let record = Assignment::open(unit.id, person, start);
            let record_id = record.id;
            self.insert(record)?;
            opened = Some(record_id);
            tracing::debug!(unit = %unit.id, %person, %start, "opened assignment");
        }

        Ok(ReconcileOutcome { closed, opened })
    }

    /// Drop a unit's entire history. Called when the owning unit is removed;
    /// assignment records are cascade-deleted with their unit.
    pub fn remove_unit(&mut self, unit: Uuid) {
        self.by_unit.remove(&unit);
    }

    /// Whether a unit's history satisfies the non-overlap invariant.
    /// Intended for integrity checks and tests, not hot paths.
    #[must_use]
    pub fn is_consistent(&self, unit: Uuid) -> bool {
        let records = self.history(unit);
        records.iter().enumerate().all(|(i, record)| {
            record.is_well_formed()
                && records[i + 1..].iter().all(|other| !record.overlaps(other))
        })
    }
}
