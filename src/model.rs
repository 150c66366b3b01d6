use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds (UTC). The only instant type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Touching boundaries (`self.end == other.start`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

// ── Chambers ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChamberStatus {
    Available,
    Occupied,
    Maintenance,
    Cleaning,
    Reserved,
    Disabled,
}

impl ChamberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChamberStatus::Available => "available",
            ChamberStatus::Occupied => "occupied",
            ChamberStatus::Maintenance => "maintenance",
            ChamberStatus::Cleaning => "cleaning",
            ChamberStatus::Reserved => "reserved",
            ChamberStatus::Disabled => "disabled",
        }
    }

    /// Statuses that refuse an explicitly requested booking outright.
    pub fn is_out_of_service(&self) -> bool {
        matches!(self, ChamberStatus::Maintenance | ChamberStatus::Disabled)
    }
}

impl fmt::Display for ChamberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical treatment room within a facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chamber {
    pub id: Ulid,
    pub facility_id: Ulid,
    pub name: String,
    pub floor: u32,
    /// Service category the room is suited for (e.g. "therapy").
    pub kind: String,
    pub equipment: BTreeSet<String>,
    pub status: ChamberStatus,
}

impl Chamber {
    pub fn has_equipment(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.equipment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChamber {
    pub id: Ulid,
    pub facility_id: Ulid,
    pub name: String,
    pub floor: u32,
    pub kind: String,
    pub equipment: BTreeSet<String>,
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    /// Active bookings still occupy their window for conflict purposes.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracked alongside the lifecycle but never driven by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub patient_id: Ulid,
    pub doctor_id: Ulid,
    pub chamber_id: Ulid,
    pub facility_id: Ulid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_min: u32,
    /// `[start, start + duration)` derived from `date`, `start_time`, `duration_min`.
    pub span: Span,
    pub service_type: String,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub created_by: Ulid,
    pub cancelled_at: Option<Ms>,
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleStatus {
    Reserved,
    Occupied,
    Cancelled,
}

impl ScheduleStatus {
    /// Ledger status mirroring a booking status.
    pub fn for_booking(status: BookingStatus) -> Self {
        match status {
            BookingStatus::Pending => ScheduleStatus::Reserved,
            BookingStatus::Confirmed | BookingStatus::Completed => ScheduleStatus::Occupied,
            BookingStatus::Cancelled => ScheduleStatus::Cancelled,
        }
    }
}

/// Ledger entry recording a chamber's occupancy for one booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChamberSchedule {
    pub id: Ulid,
    pub chamber_id: Ulid,
    pub booking_id: Ulid,
    pub status: ScheduleStatus,
    pub span: Span,
}

// ── Callers ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Patient,
    Doctor,
    Admin,
    FacilityAdmin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Patient, Role::Doctor, Role::Admin, Role::FacilityAdmin];

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::FacilityAdmin)
    }

    /// Providers and administrators see every booking in a projection.
    pub fn sees_all_bookings(&self) -> bool {
        self.is_admin() || *self == Role::Doctor
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
            Role::FacilityAdmin => "facility_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity supplied by the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Ulid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Ulid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn can_see(&self, booking: &Booking) -> bool {
        self.role.sees_all_bookings() || booking.patient_id == self.id
    }
}

// ── Requests ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mobility {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBooking {
    pub patient_id: Ulid,
    pub doctor_id: Ulid,
    pub facility_id: Ulid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_min: u32,
    pub service_type: String,
    pub notes: Option<String>,
    /// `None` lets the engine pick the best free chamber.
    pub chamber_id: Option<Ulid>,
    pub equipment_needed: BTreeSet<String>,
    pub patient_mobility: Option<Mobility>,
    /// Overrides the provider's stored chamber preferences.
    pub doctor_preference: Option<Vec<Ulid>>,
}

/// Fields left `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateBooking {
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub duration_min: Option<u32>,
    pub chamber_id: Option<Ulid>,
    pub notes: Option<String>,
}

// ── Durable events ───────────────────────────────────────────────

/// Flat event types, no nesting. This is the WAL record format.
///
/// A booking and its schedule entry are always written by a single event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    FacilityRegistered {
        id: Ulid,
        name: String,
    },
    ChamberRegistered {
        chamber: Chamber,
    },
    ChamberStatusChanged {
        id: Ulid,
        status: ChamberStatus,
    },
    DoctorPreferencesSet {
        doctor_id: Ulid,
        chambers: Vec<Ulid>,
    },
    BookingCreated {
        booking: Booking,
        schedule: ChamberSchedule,
    },
    BookingRescheduled {
        id: Ulid,
        chamber_id: Ulid,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_min: u32,
        span: Span,
        notes: Option<String>,
    },
    BookingConfirmed {
        id: Ulid,
    },
    BookingCancelled {
        id: Ulid,
        at: Ms,
        reason: Option<String>,
    },
    BookingCompleted {
        id: Ulid,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn only_pending_and_confirmed_are_active() {
        let active: Vec<_> = BookingStatus::ALL.iter().filter(|s| s.is_active()).collect();
        assert_eq!(active, vec![&BookingStatus::Pending, &BookingStatus::Confirmed]);
    }

    #[test]
    fn schedule_status_mirrors_booking() {
        assert_eq!(ScheduleStatus::for_booking(BookingStatus::Pending), ScheduleStatus::Reserved);
        assert_eq!(ScheduleStatus::for_booking(BookingStatus::Confirmed), ScheduleStatus::Occupied);
        assert_eq!(ScheduleStatus::for_booking(BookingStatus::Cancelled), ScheduleStatus::Cancelled);
    }

    #[test]
    fn equipment_superset_check() {
        let chamber = Chamber {
            id: Ulid::new(),
            facility_id: Ulid::new(),
            name: "C1".into(),
            floor: 1,
            kind: "therapy".into(),
            equipment: ["oxygen".to_string(), "monitor".to_string()].into(),
            status: ChamberStatus::Available,
        };
        assert!(chamber.has_equipment(&BTreeSet::new()));
        assert!(chamber.has_equipment(&["oxygen".to_string()].into()));
        assert!(!chamber.has_equipment(&["oxygen".to_string(), "suction".to_string()].into()));
    }

    #[test]
    fn patients_only_see_their_own_bookings() {
        let patient = Ulid::new();
        let booking = Booking {
            id: Ulid::new(),
            patient_id: patient,
            doctor_id: Ulid::new(),
            chamber_id: Ulid::new(),
            facility_id: Ulid::new(),
            date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            duration_min: 60,
            span: Span::new(0, 60 * MINUTE_MS),
            service_type: "therapy".into(),
            notes: None,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            created_by: patient,
            cancelled_at: None,
            cancellation_reason: None,
        };
        assert!(Actor::new(patient, Role::Patient).can_see(&booking));
        assert!(!Actor::new(Ulid::new(), Role::Patient).can_see(&booking));
        assert!(Actor::new(Ulid::new(), Role::Doctor).can_see(&booking));
        assert!(Actor::new(Ulid::new(), Role::FacilityAdmin).can_see(&booking));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ChamberRegistered {
            chamber: Chamber {
                id: Ulid::new(),
                facility_id: Ulid::new(),
                name: "Hyperbaric A".into(),
                floor: 2,
                kind: "hbot".into(),
                equipment: ["oxygen".to_string()].into(),
                status: ChamberStatus::Available,
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
