use std::time::Instant;

use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{booking_window, check_no_conflict, date_of, day_span, validate_text};
use super::ledger::Ledger;
use super::lifecycle::{authorize, BookingAction};
use super::queries::select_chamber;
use super::scoring::AssignmentFactors;
use super::{Engine, EngineError};

/// An explicitly named chamber must belong to the facility, be in service
/// (when newly chosen) and be free for `span`.
fn check_explicit_chamber(
    ledger: &Ledger,
    facility_id: Ulid,
    chamber_id: Ulid,
    span: &Span,
    exclude: Option<Ulid>,
    check_status: bool,
) -> Result<(), EngineError> {
    let chamber = ledger
        .chamber(&chamber_id)
        .filter(|c| c.facility_id == facility_id)
        .ok_or(EngineError::NotFound(chamber_id))?;
    if check_status && chamber.status.is_out_of_service() {
        return Err(EngineError::ChamberUnavailable {
            chamber: chamber_id,
            status: chamber.status,
        });
    }
    check_no_conflict(ledger.chamber_bookings(&chamber_id), span, exclude)
}

impl Engine {
    // ── Facility administration ──────────────────────────────

    pub async fn register_facility(&self, id: Ulid, name: String) -> Result<(), EngineError> {
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::Validation("facility name too long"));
        }
        let mut ledger = self.ledger.write().await;
        if ledger.has_facility(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        self.commit(&mut ledger, Event::FacilityRegistered { id, name }).await
    }

    pub async fn register_chamber(&self, new: NewChamber) -> Result<Chamber, EngineError> {
        if new.name.len() > MAX_NAME_LEN || new.kind.len() > MAX_SERVICE_TYPE_LEN {
            return Err(EngineError::Validation("chamber name or type too long"));
        }
        if new.equipment.len() > MAX_EQUIPMENT_TAGS {
            return Err(EngineError::Validation("too many equipment tags"));
        }
        let mut ledger = self.ledger.write().await;
        if !ledger.has_facility(&new.facility_id) {
            return Err(EngineError::NotFound(new.facility_id));
        }
        if ledger.chamber(&new.id).is_some() {
            return Err(EngineError::AlreadyExists(new.id));
        }

        let chamber = Chamber {
            id: new.id,
            facility_id: new.facility_id,
            name: new.name,
            floor: new.floor,
            kind: new.kind,
            equipment: new.equipment,
            status: ChamberStatus::Available,
        };
        self.commit(&mut ledger, Event::ChamberRegistered { chamber: chamber.clone() })
            .await?;
        Ok(chamber)
    }

    /// Coarse status toggle, e.g. by the maintenance workflow.
    pub async fn set_chamber_status(
        &self,
        id: Ulid,
        status: ChamberStatus,
    ) -> Result<Chamber, EngineError> {
        let mut ledger = self.ledger.write().await;
        if ledger.chamber(&id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        self.commit(&mut ledger, Event::ChamberStatusChanged { id, status })
            .await?;
        info!("chamber {id} is now {status}");
        ledger.chamber(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Store the chambers a provider prefers, used when a create request
    /// carries no preference of its own.
    pub async fn set_doctor_preferences(
        &self,
        doctor_id: Ulid,
        chambers: Vec<Ulid>,
    ) -> Result<(), EngineError> {
        if chambers.len() > MAX_PREFERRED_CHAMBERS {
            return Err(EngineError::Validation("too many preferred chambers"));
        }
        let mut ledger = self.ledger.write().await;
        if let Some(missing) = chambers.iter().find(|id| ledger.chamber(id).is_none()) {
            return Err(EngineError::NotFound(*missing));
        }
        self.commit(&mut ledger, Event::DoctorPreferencesSet { doctor_id, chambers })
            .await
    }

    // ── Booking lifecycle ────────────────────────────────────

    /// Create a pending booking and its reserved schedule entry.
    ///
    /// Without `chamber_id` the best free chamber is assigned; with it, that
    /// chamber is conflict-checked. The provider is conflict-checked either way.
    pub async fn create_booking(
        &self,
        actor: &Actor,
        req: CreateBooking,
    ) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self.create_booking_inner(actor, req).await;
        observability::record_operation("create_booking", started, &result);
        result
    }

    async fn create_booking_inner(
        &self,
        actor: &Actor,
        req: CreateBooking,
    ) -> Result<Booking, EngineError> {
        if req.service_type.is_empty() || req.service_type.len() > MAX_SERVICE_TYPE_LEN {
            return Err(EngineError::Validation("service type must be 1-128 bytes"));
        }
        validate_text(req.notes.as_deref(), MAX_NOTES_LEN, "notes too long")?;
        if req.equipment_needed.len() > MAX_EQUIPMENT_TAGS {
            return Err(EngineError::Validation("too many equipment tags"));
        }
        let span = booking_window(req.date, req.start_time, req.duration_min)?;

        let mut ledger = self.ledger.write().await;
        if !ledger.has_facility(&req.facility_id) {
            return Err(EngineError::NotFound(req.facility_id));
        }
        check_no_conflict(ledger.doctor_bookings(&req.doctor_id), &span, None)?;

        let (chamber_id, assignment) = match req.chamber_id {
            Some(chamber_id) => {
                check_explicit_chamber(&ledger, req.facility_id, chamber_id, &span, None, true)?;
                (chamber_id, "explicit")
            }
            None => {
                let factors = AssignmentFactors {
                    service_type: req.service_type.clone(),
                    duration_min: req.duration_min,
                    equipment_needed: req.equipment_needed,
                    doctor_preference: req
                        .doctor_preference
                        .unwrap_or_else(|| ledger.doctor_preferences(&req.doctor_id).to_vec()),
                    patient_mobility: req.patient_mobility,
                };
                let today = day_span(date_of(self.now()));
                let chamber = select_chamber(&ledger, req.facility_id, &span, &factors, &today)?;
                (chamber.id, "optimal")
            }
        };

        let booking = Booking {
            id: Ulid::new(),
            patient_id: req.patient_id,
            doctor_id: req.doctor_id,
            chamber_id,
            facility_id: req.facility_id,
            date: req.date,
            start_time: req.start_time,
            duration_min: req.duration_min,
            span,
            service_type: req.service_type,
            notes: req.notes,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::default(),
            created_by: actor.id,
            cancelled_at: None,
            cancellation_reason: None,
        };
        let schedule = ChamberSchedule {
            id: Ulid::new(),
            chamber_id,
            booking_id: booking.id,
            status: ScheduleStatus::Reserved,
            span,
        };
        self.commit(
            &mut ledger,
            Event::BookingCreated {
                booking: booking.clone(),
                schedule,
            },
        )
        .await?;

        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL, "assignment" => assignment)
            .increment(1);
        info!(
            "booking {} created on chamber {chamber_id} ({assignment}) for {} at {}",
            booking.id, booking.date, booking.start_time
        );
        Ok(booking)
    }

    /// Move a booking in time and/or to another chamber. The booking's own
    /// prior window is excluded from the conflict re-check.
    pub async fn update_booking(
        &self,
        actor: &Actor,
        id: Ulid,
        req: UpdateBooking,
    ) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self.update_booking_inner(actor, id, req).await;
        observability::record_operation("update_booking", started, &result);
        result
    }

    async fn update_booking_inner(
        &self,
        actor: &Actor,
        id: Ulid,
        req: UpdateBooking,
    ) -> Result<Booking, EngineError> {
        validate_text(req.notes.as_deref(), MAX_NOTES_LEN, "notes too long")?;

        let mut ledger = self.ledger.write().await;
        let current = ledger.booking(&id).ok_or(EngineError::NotFound(id))?;
        authorize(current, actor, BookingAction::Reschedule)?;

        let date = req.date.unwrap_or(current.date);
        let start_time = req.start_time.unwrap_or(current.start_time);
        let duration_min = req.duration_min.unwrap_or(current.duration_min);
        let chamber_id = req.chamber_id.unwrap_or(current.chamber_id);
        let moved_chamber = chamber_id != current.chamber_id;
        let (facility_id, doctor_id) = (current.facility_id, current.doctor_id);

        let span = booking_window(date, start_time, duration_min)?;
        check_no_conflict(ledger.doctor_bookings(&doctor_id), &span, Some(id))?;
        check_explicit_chamber(&ledger, facility_id, chamber_id, &span, Some(id), moved_chamber)?;

        let event = Event::BookingRescheduled {
            id,
            chamber_id,
            date,
            start_time,
            duration_min,
            span,
            notes: req.notes,
        };
        self.commit(&mut ledger, event).await?;
        info!("booking {id} rescheduled to chamber {chamber_id} at {date} {start_time}");
        ledger.booking(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Provider accepts a pending booking; its schedule entry becomes occupied.
    pub async fn confirm_booking(&self, actor: &Actor, id: Ulid) -> Result<Booking, EngineError> {
        self.transition(actor, id, BookingAction::Confirm, |id| Event::BookingConfirmed { id })
            .await
    }

    /// Patient withdraws an active booking, releasing its window.
    pub async fn cancel_booking(
        &self,
        actor: &Actor,
        id: Ulid,
        reason: Option<String>,
    ) -> Result<Booking, EngineError> {
        validate_text(reason.as_deref(), MAX_REASON_LEN, "cancellation reason too long")?;
        let at = self.now();
        self.transition(actor, id, BookingAction::Cancel, |id| Event::BookingCancelled {
            id,
            at,
            reason,
        })
        .await
    }

    /// Provider marks a confirmed booking as done. Terminal.
    pub async fn complete_booking(&self, actor: &Actor, id: Ulid) -> Result<Booking, EngineError> {
        self.transition(actor, id, BookingAction::Complete, |id| Event::BookingCompleted { id })
            .await
    }

    async fn transition(
        &self,
        actor: &Actor,
        id: Ulid,
        action: BookingAction,
        event: impl FnOnce(Ulid) -> Event,
    ) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self.transition_inner(actor, id, action, event).await;
        observability::record_operation(action.as_str(), started, &result);
        result
    }

    async fn transition_inner(
        &self,
        actor: &Actor,
        id: Ulid,
        action: BookingAction,
        event: impl FnOnce(Ulid) -> Event,
    ) -> Result<Booking, EngineError> {
        let mut ledger = self.ledger.write().await;
        let booking = ledger.booking(&id).ok_or(EngineError::NotFound(id))?;
        if let Err(e) = authorize(booking, actor, action) {
            debug!("rejected {action} on booking {id}: {e}");
            return Err(e);
        }
        self.commit(&mut ledger, event(id)).await?;
        metrics::counter!(observability::TRANSITIONS_TOTAL, "action" => action.as_str())
            .increment(1);
        info!("booking {id}: {action} by {} {}", actor.role, actor.id);
        ledger.booking(&id).cloned().ok_or(EngineError::NotFound(id))
    }
}
