use chrono::{Days, NaiveDate};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{available_chambers, ChamberFilter};
use super::conflict::{conflicting, date_of, day_span, validate_window};
use super::ledger::Ledger;
use super::scoring::{pick_optimal, usage_counts, AssignmentFactors};
use super::{Engine, EngineError};

/// Resolve free chambers, then score them. `today` is the day whose bookings
/// count toward each chamber's usage penalty.
pub(super) fn select_chamber<'a>(
    ledger: &'a Ledger,
    facility_id: Ulid,
    window: &Span,
    factors: &AssignmentFactors,
    today: &Span,
) -> Result<&'a Chamber, EngineError> {
    let candidates = available_chambers(ledger, facility_id, window, &ChamberFilter::default());
    let usage = usage_counts(ledger, &candidates, today);
    pick_optimal(&candidates, factors, &usage).ok_or_else(|| {
        metrics::counter!(crate::observability::NO_CHAMBER_AVAILABLE_TOTAL).increment(1);
        EngineError::NoAvailableChamber
    })
}

/// Visible bookings dated within `[from, to]`, ordered by start time.
/// Visibility is decided before any date filtering.
fn project<'a>(
    actor: &Actor,
    bookings: impl Iterator<Item = &'a Booking>,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<Booking> {
    let mut out: Vec<Booking> = bookings
        .filter(|b| actor.can_see(b))
        .filter(|b| from <= b.date && b.date <= to)
        .cloned()
        .collect();
    out.sort_by_key(|b| (b.span.start, b.id));
    out
}

fn check_range(from: NaiveDate, to: NaiveDate) -> Result<(), EngineError> {
    if (to - from).num_days() > MAX_PROJECTION_DAYS {
        return Err(EngineError::Validation("date range too wide"));
    }
    Ok(())
}

impl Engine {
    /// A single booking, if it exists and `actor` may see it.
    pub async fn get_booking(&self, actor: &Actor, id: Ulid) -> Result<Booking, EngineError> {
        let ledger = self.ledger.read().await;
        ledger
            .booking(&id)
            .filter(|b| actor.can_see(b))
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    /// The ledger entry mirroring a booking, under the same visibility as
    /// [`Engine::get_booking`].
    pub async fn get_schedule_entry(
        &self,
        actor: &Actor,
        booking_id: Ulid,
    ) -> Result<ChamberSchedule, EngineError> {
        let ledger = self.ledger.read().await;
        ledger
            .booking(&booking_id)
            .filter(|b| actor.can_see(b))
            .and_then(|b| ledger.schedule_for(&b.id))
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))
    }

    pub async fn list_chambers(&self, facility_id: Ulid) -> Result<Vec<Chamber>, EngineError> {
        let ledger = self.ledger.read().await;
        if !ledger.has_facility(&facility_id) {
            return Err(EngineError::NotFound(facility_id));
        }
        Ok(ledger.chambers_in(facility_id).cloned().collect())
    }

    /// Chambers free for `window` that pass `filter`. Empty is a valid answer.
    pub async fn get_available_chambers(
        &self,
        facility_id: Ulid,
        window: Span,
        filter: &ChamberFilter,
    ) -> Result<Vec<Chamber>, EngineError> {
        validate_window(&window)?;
        let ledger = self.ledger.read().await;
        if !ledger.has_facility(&facility_id) {
            return Err(EngineError::NotFound(facility_id));
        }
        Ok(available_chambers(&ledger, facility_id, &window, filter)
            .into_iter()
            .cloned()
            .collect())
    }

    /// The chamber a create without an explicit chamber would receive.
    pub async fn assign_optimal_chamber(
        &self,
        facility_id: Ulid,
        window: Span,
        factors: &AssignmentFactors,
    ) -> Result<Chamber, EngineError> {
        validate_window(&window)?;
        let ledger = self.ledger.read().await;
        if !ledger.has_facility(&facility_id) {
            return Err(EngineError::NotFound(facility_id));
        }
        let today = day_span(date_of(self.now()));
        select_chamber(&ledger, facility_id, &window, factors, &today).cloned()
    }

    /// Active bookings of `doctor_id` overlapping `window`, for UI pre-checks.
    /// `exclude` skips the booking being edited.
    pub async fn check_conflicts(
        &self,
        doctor_id: Ulid,
        window: Span,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Booking>, EngineError> {
        validate_window(&window)?;
        let ledger = self.ledger.read().await;
        let mut hits: Vec<Booking> = conflicting(ledger.doctor_bookings(&doctor_id), &window, exclude)
            .cloned()
            .collect();
        hits.sort_by_key(|b| (b.span.start, b.id));
        Ok(hits)
    }

    // ── Schedule projections ─────────────────────────────────
    //
    // Bookings are placed on the calendar date they start. One that runs past
    // midnight is listed on its start date only.

    /// Bookings at `facility_id` starting on `date`.
    pub async fn get_daily_schedule(
        &self,
        actor: &Actor,
        facility_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, EngineError> {
        let ledger = self.ledger.read().await;
        if !ledger.has_facility(&facility_id) {
            return Err(EngineError::NotFound(facility_id));
        }
        let at_facility = ledger.bookings().filter(|b| b.facility_id == facility_id);
        Ok(project(actor, at_facility, date, date))
    }

    /// Bookings at `facility_id` starting in the seven days from `start`.
    pub async fn get_weekly_schedule(
        &self,
        actor: &Actor,
        facility_id: Ulid,
        start: NaiveDate,
    ) -> Result<Vec<Booking>, EngineError> {
        let ledger = self.ledger.read().await;
        if !ledger.has_facility(&facility_id) {
            return Err(EngineError::NotFound(facility_id));
        }
        let end = start.checked_add_days(Days::new(6)).unwrap_or(NaiveDate::MAX);
        let at_facility = ledger.bookings().filter(|b| b.facility_id == facility_id);
        Ok(project(actor, at_facility, start, end))
    }

    /// A provider's bookings dated within `[from, to]`.
    pub async fn get_provider_schedule(
        &self,
        actor: &Actor,
        doctor_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Booking>, EngineError> {
        check_range(from, to)?;
        let ledger = self.ledger.read().await;
        Ok(project(actor, ledger.doctor_bookings(&doctor_id), from, to))
    }

    /// A chamber's bookings dated within `[from, to]`.
    pub async fn get_chamber_schedule(
        &self,
        actor: &Actor,
        chamber_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Booking>, EngineError> {
        check_range(from, to)?;
        let ledger = self.ledger.read().await;
        if ledger.chamber(&chamber_id).is_none() {
            return Err(EngineError::NotFound(chamber_id));
        }
        Ok(project(actor, ledger.chamber_bookings(&chamber_id), from, to))
    }
}
