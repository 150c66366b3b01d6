use std::collections::BTreeSet;

use ulid::Ulid;

use crate::model::*;

use super::conflict::has_conflict;
use super::ledger::Ledger;

/// Structural filters for [`available_chambers`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChamberFilter {
    pub kind: Option<String>,
    pub floor: Option<u32>,
    /// Chambers must carry every listed tag; extra equipment is fine.
    pub equipment: BTreeSet<String>,
}

impl ChamberFilter {
    fn admits(&self, chamber: &Chamber) -> bool {
        self.kind.as_ref().is_none_or(|k| *k == chamber.kind)
            && self.floor.is_none_or(|f| f == chamber.floor)
    }
}

/// Chambers of `facility_id` that are `available` and free for `window`.
///
/// 1. Cheap structural rejection first: status, kind, floor.
/// 2. Conflict check against each survivor's active bookings.
/// 3. Equipment superset filter.
///
/// Each chamber appears at most once. Callers must not rely on the order.
pub fn available_chambers<'a>(
    ledger: &'a Ledger,
    facility_id: Ulid,
    window: &Span,
    filter: &ChamberFilter,
) -> Vec<&'a Chamber> {
    ledger
        .chambers_in(facility_id)
        .filter(|c| c.status == ChamberStatus::Available && filter.admits(c))
        .filter(|c| !has_conflict(&ledger.active_windows(&c.id), window))
        .filter(|c| c.has_equipment(&filter.equipment))
        .collect()
}
