use std::collections::{BTreeMap, HashMap};

use ulid::Ulid;

use crate::model::*;

/// In-memory scheduling state. Mutated only through [`Ledger::apply`], so
/// replaying the event log reproduces it exactly.
#[derive(Debug, Default)]
pub struct Ledger {
    facilities: BTreeMap<Ulid, String>,
    /// BTreeMap keeps chamber iteration in id order.
    chambers: BTreeMap<Ulid, Chamber>,
    bookings: HashMap<Ulid, Booking>,
    /// Keyed by booking id: exactly one entry per booking.
    schedules: HashMap<Ulid, ChamberSchedule>,
    doctor_preferences: HashMap<Ulid, Vec<Ulid>>,
    by_chamber: HashMap<Ulid, Vec<Ulid>>,
    by_doctor: HashMap<Ulid, Vec<Ulid>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild state from a sequence of events (e.g. a WAL replay).
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut ledger = Self::new();
        for event in events {
            ledger.apply(event);
        }
        ledger
    }

    // ── Lookups ──────────────────────────────────────────────

    pub fn has_facility(&self, id: &Ulid) -> bool {
        self.facilities.contains_key(id)
    }

    pub fn facility_count(&self) -> usize {
        self.facilities.len()
    }

    pub fn chamber(&self, id: &Ulid) -> Option<&Chamber> {
        self.chambers.get(id)
    }

    pub fn chamber_count(&self) -> usize {
        self.chambers.len()
    }

    /// Chambers of a facility, in id order.
    pub fn chambers_in(&self, facility_id: Ulid) -> impl Iterator<Item = &Chamber> {
        self.chambers
            .values()
            .filter(move |c| c.facility_id == facility_id)
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.get(id)
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub fn bookings(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.values()
    }

    pub fn schedule_for(&self, booking_id: &Ulid) -> Option<&ChamberSchedule> {
        self.schedules.get(booking_id)
    }

    /// All bookings ever placed on a chamber, any status.
    pub fn chamber_bookings(&self, chamber_id: &Ulid) -> impl Iterator<Item = &Booking> {
        self.indexed(&self.by_chamber, chamber_id)
    }

    /// All bookings ever placed with a provider, any status.
    pub fn doctor_bookings(&self, doctor_id: &Ulid) -> impl Iterator<Item = &Booking> {
        self.indexed(&self.by_doctor, doctor_id)
    }

    fn indexed<'a>(
        &'a self,
        index: &'a HashMap<Ulid, Vec<Ulid>>,
        key: &Ulid,
    ) -> impl Iterator<Item = &'a Booking> + use<'a> {
        index
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.bookings.get(id))
    }

    /// Active windows currently holding a chamber.
    pub fn active_windows(&self, chamber_id: &Ulid) -> Vec<Span> {
        self.chamber_bookings(chamber_id)
            .filter(|b| b.status.is_active())
            .map(|b| b.span)
            .collect()
    }

    pub fn doctor_preferences(&self, doctor_id: &Ulid) -> &[Ulid] {
        self.doctor_preferences
            .get(doctor_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Facility an event belongs to, for per-facility notification.
    pub fn facility_of(&self, event: &Event) -> Option<Ulid> {
        match event {
            Event::FacilityRegistered { id, .. } => Some(*id),
            Event::ChamberRegistered { chamber } => Some(chamber.facility_id),
            Event::ChamberStatusChanged { id, .. } => self.chamber(id).map(|c| c.facility_id),
            Event::DoctorPreferencesSet { .. } => None,
            Event::BookingCreated { booking, .. } => Some(booking.facility_id),
            Event::BookingRescheduled { id, .. }
            | Event::BookingConfirmed { id }
            | Event::BookingCancelled { id, .. }
            | Event::BookingCompleted { id } => self.booking(id).map(|b| b.facility_id),
        }
    }

    // ── Event application ────────────────────────────────────

    /// Apply a committed event. Events naming unknown ids are ignored.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::FacilityRegistered { id, name } => {
                self.facilities.insert(*id, name.clone());
            }
            Event::ChamberRegistered { chamber } => {
                self.chambers.insert(chamber.id, chamber.clone());
            }
            Event::ChamberStatusChanged { id, status } => {
                if let Some(chamber) = self.chambers.get_mut(id) {
                    chamber.status = *status;
                }
            }
            Event::DoctorPreferencesSet { doctor_id, chambers } => {
                self.doctor_preferences.insert(*doctor_id, chambers.clone());
            }
            Event::BookingCreated { booking, schedule } => {
                self.by_chamber
                    .entry(booking.chamber_id)
                    .or_default()
                    .push(booking.id);
                self.by_doctor
                    .entry(booking.doctor_id)
                    .or_default()
                    .push(booking.id);
                self.bookings.insert(booking.id, booking.clone());
                self.schedules.insert(booking.id, schedule.clone());
            }
            Event::BookingRescheduled {
                id,
                chamber_id,
                date,
                start_time,
                duration_min,
                span,
                notes,
            } => {
                let Some(booking) = self.bookings.get_mut(id) else {
                    return;
                };
                if booking.chamber_id != *chamber_id {
                    if let Some(ids) = self.by_chamber.get_mut(&booking.chamber_id) {
                        ids.retain(|b| b != id);
                    }
                    self.by_chamber.entry(*chamber_id).or_default().push(*id);
                }
                booking.chamber_id = *chamber_id;
                booking.date = *date;
                booking.start_time = *start_time;
                booking.duration_min = *duration_min;
                booking.span = *span;
                if notes.is_some() {
                    booking.notes = notes.clone();
                }
                if let Some(entry) = self.schedules.get_mut(id) {
                    entry.chamber_id = *chamber_id;
                    entry.span = *span;
                }
            }
            Event::BookingConfirmed { id } => {
                self.set_status(id, BookingStatus::Confirmed);
            }
            Event::BookingCancelled { id, at, reason } => {
                if let Some(booking) = self.bookings.get_mut(id) {
                    booking.cancelled_at = Some(*at);
                    booking.cancellation_reason = reason.clone();
                }
                self.set_status(id, BookingStatus::Cancelled);
            }
            Event::BookingCompleted { id } => {
                self.set_status(id, BookingStatus::Completed);
            }
        }
    }

    fn set_status(&mut self, booking_id: &Ulid, status: BookingStatus) {
        if let Some(booking) = self.bookings.get_mut(booking_id) {
            booking.status = status;
        }
        if let Some(entry) = self.schedules.get_mut(booking_id) {
            entry.status = ScheduleStatus::for_booking(status);
        }
    }

    /// Minimal event sequence that recreates the current state.
    pub fn snapshot(&self) -> Vec<Event> {
        let mut events = Vec::with_capacity(
            self.facilities.len() + self.chambers.len() + self.bookings.len(),
        );
        events.extend(
            self.facilities
                .iter()
                .map(|(id, name)| Event::FacilityRegistered { id: *id, name: name.clone() }),
        );
        events.extend(
            self.chambers
                .values()
                .map(|c| Event::ChamberRegistered { chamber: c.clone() }),
        );
        events.extend(self.doctor_preferences.iter().map(|(doctor_id, chambers)| {
            Event::DoctorPreferencesSet {
                doctor_id: *doctor_id,
                chambers: chambers.clone(),
            }
        }));

        let mut bookings: Vec<&Booking> = self.bookings.values().collect();
        bookings.sort_by_key(|b| b.id);
        for booking in bookings {
            if let Some(schedule) = self.schedules.get(&booking.id) {
                events.push(Event::BookingCreated {
                    booking: booking.clone(),
                    schedule: schedule.clone(),
                });
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn chamber(facility_id: Ulid) -> Chamber {
        Chamber {
            id: Ulid::new(),
            facility_id,
            name: "C".into(),
            floor: 1,
            kind: "therapy".into(),
            equipment: Default::default(),
            status: ChamberStatus::Available,
        }
    }

    fn booking_on(chamber: &Chamber, doctor: Ulid, span: Span) -> (Booking, ChamberSchedule) {
        let booking = Booking {
            id: Ulid::new(),
            patient_id: Ulid::new(),
            doctor_id: doctor,
            chamber_id: chamber.id,
            facility_id: chamber.facility_id,
            date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            duration_min: 60,
            span,
            service_type: "therapy".into(),
            notes: None,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            created_by: doctor,
            cancelled_at: None,
            cancellation_reason: None,
        };
        let schedule = ChamberSchedule {
            id: Ulid::new(),
            chamber_id: chamber.id,
            booking_id: booking.id,
            status: ScheduleStatus::Reserved,
            span,
        };
        (booking, schedule)
    }

    fn seeded() -> (Ledger, Chamber, Chamber, Booking) {
        let facility = Ulid::new();
        let c1 = chamber(facility);
        let c2 = chamber(facility);
        let (booking, schedule) = booking_on(&c1, Ulid::new(), Span::new(0, 1000));
        let ledger = Ledger::from_events(&[
            Event::FacilityRegistered { id: facility, name: "F".into() },
            Event::ChamberRegistered { chamber: c1.clone() },
            Event::ChamberRegistered { chamber: c2.clone() },
            Event::BookingCreated { booking: booking.clone(), schedule },
        ]);
        (ledger, c1, c2, booking)
    }

    #[test]
    fn created_booking_is_indexed_by_chamber_and_doctor() {
        let (ledger, c1, c2, booking) = seeded();
        assert_eq!(ledger.chamber_bookings(&c1.id).count(), 1);
        assert_eq!(ledger.chamber_bookings(&c2.id).count(), 0);
        assert_eq!(ledger.doctor_bookings(&booking.doctor_id).count(), 1);
        assert_eq!(ledger.active_windows(&c1.id), vec![Span::new(0, 1000)]);
        assert_eq!(ledger.schedule_for(&booking.id).unwrap().status, ScheduleStatus::Reserved);
    }

    #[test]
    fn status_changes_move_schedule_in_lock_step() {
        let (mut ledger, c1, _, booking) = seeded();
        ledger.apply(&Event::BookingConfirmed { id: booking.id });
        assert_eq!(ledger.booking(&booking.id).unwrap().status, BookingStatus::Confirmed);
        assert_eq!(ledger.schedule_for(&booking.id).unwrap().status, ScheduleStatus::Occupied);

        ledger.apply(&Event::BookingCancelled {
            id: booking.id,
            at: 42,
            reason: Some("sick".into()),
        });
        let cancelled = ledger.booking(&booking.id).unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.cancelled_at, Some(42));
        assert_eq!(ledger.schedule_for(&booking.id).unwrap().status, ScheduleStatus::Cancelled);
        assert!(ledger.active_windows(&c1.id).is_empty());
    }

    #[test]
    fn reschedule_moves_booking_between_chambers() {
        let (mut ledger, c1, c2, booking) = seeded();
        ledger.apply(&Event::BookingRescheduled {
            id: booking.id,
            chamber_id: c2.id,
            date: booking.date,
            start_time: booking.start_time,
            duration_min: 30,
            span: Span::new(0, 500),
            notes: None,
        });
        assert_eq!(ledger.chamber_bookings(&c1.id).count(), 0);
        assert_eq!(ledger.active_windows(&c2.id), vec![Span::new(0, 500)]);
        let entry = ledger.schedule_for(&booking.id).unwrap();
        assert_eq!(entry.chamber_id, c2.id);
        assert_eq!(entry.span, Span::new(0, 500));
    }

    #[test]
    fn snapshot_replays_to_same_state() {
        let (mut ledger, c1, _, booking) = seeded();
        ledger.apply(&Event::ChamberStatusChanged { id: c1.id, status: ChamberStatus::Cleaning });
        ledger.apply(&Event::BookingConfirmed { id: booking.id });
        ledger.apply(&Event::DoctorPreferencesSet { doctor_id: booking.doctor_id, chambers: vec![c1.id] });

        let rebuilt = Ledger::from_events(&ledger.snapshot());
        assert_eq!(rebuilt.chamber(&c1.id), ledger.chamber(&c1.id));
        assert_eq!(rebuilt.booking(&booking.id), ledger.booking(&booking.id));
        assert_eq!(rebuilt.schedule_for(&booking.id), ledger.schedule_for(&booking.id));
        assert_eq!(rebuilt.doctor_preferences(&booking.doctor_id), &[c1.id]);
        assert_eq!(rebuilt.facility_count(), 1);
    }

    #[test]
    fn events_for_unknown_ids_are_ignored() {
        let mut ledger = Ledger::new();
        ledger.apply(&Event::BookingConfirmed { id: Ulid::new() });
        ledger.apply(&Event::ChamberStatusChanged { id: Ulid::new(), status: ChamberStatus::Disabled });
        assert_eq!(ledger.booking_count(), 0);
        assert_eq!(ledger.chamber_count(), 0);
    }
}
