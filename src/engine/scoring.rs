use std::collections::{BTreeSet, HashMap};

use ulid::Ulid;

use crate::model::*;

use super::ledger::Ledger;

pub const BASE_SCORE: i64 = 100;
pub const SERVICE_MATCH_BONUS: i64 = 30;
pub const EQUIPMENT_BONUS: i64 = 25;
pub const PREFERRED_BONUS: i64 = 20;
pub const FLOOR_PENALTY: i64 = 10;
pub const USAGE_PENALTY: i64 = 5;

/// What the booking needs from a chamber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentFactors {
    pub service_type: String,
    pub duration_min: u32,
    pub equipment_needed: BTreeSet<String>,
    /// The provider's preferred chambers.
    pub doctor_preference: Vec<Ulid>,
    pub patient_mobility: Option<Mobility>,
}

/// Score one candidate. Higher is better.
///
/// Floor 1 is the ground floor; every floor above it costs a low-mobility
/// patient `FLOOR_PENALTY`. Each booking already on the chamber today costs
/// `USAGE_PENALTY` so load spreads across rooms.
pub fn score(chamber: &Chamber, factors: &AssignmentFactors, usage_today: u32) -> i64 {
    let mut score = BASE_SCORE;
    if chamber.kind == factors.service_type {
        score += SERVICE_MATCH_BONUS;
    }
    let matching = factors
        .equipment_needed
        .iter()
        .filter(|tag| chamber.equipment.contains(*tag))
        .count() as i64;
    score += EQUIPMENT_BONUS * matching;
    if factors.doctor_preference.contains(&chamber.id) {
        score += PREFERRED_BONUS;
    }
    if factors.patient_mobility == Some(Mobility::Low) && chamber.floor > 1 {
        score -= FLOOR_PENALTY * i64::from(chamber.floor - 1);
    }
    score - USAGE_PENALTY * i64::from(usage_today)
}

/// Pick the best-scoring candidate. Equal scores go to the lowest chamber id,
/// so the result does not depend on candidate order. `None` if empty.
pub fn pick_optimal<'a>(
    candidates: &[&'a Chamber],
    factors: &AssignmentFactors,
    usage_today: &HashMap<Ulid, u32>,
) -> Option<&'a Chamber> {
    candidates
        .iter()
        .map(|c| {
            let usage = usage_today.get(&c.id).copied().unwrap_or(0);
            (score(c, factors, usage), *c)
        })
        .max_by(|(sa, a), (sb, b)| sa.cmp(sb).then_with(|| b.id.cmp(&a.id)))
        .map(|(_, c)| c)
}

/// Bookings of any status overlapping `day` on each candidate chamber.
pub fn usage_counts(ledger: &Ledger, candidates: &[&Chamber], day: &Span) -> HashMap<Ulid, u32> {
    candidates
        .iter()
        .map(|c| {
            let count = ledger
                .chamber_bookings(&c.id)
                .filter(|b| b.span.overlaps(day))
                .count() as u32;
            (c.id, count)
        })
        .collect()
}
