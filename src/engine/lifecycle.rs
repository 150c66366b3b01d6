use std::fmt;

use crate::model::*;

use super::EngineError;

/// Caller-initiated operations on an existing booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookingAction {
    Confirm,
    Cancel,
    Complete,
    Reschedule,
}

impl BookingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingAction::Confirm => "confirm",
            BookingAction::Cancel => "cancel",
            BookingAction::Complete => "complete",
            BookingAction::Reschedule => "reschedule",
        }
    }
}

impl fmt::Display for BookingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate `action` on `booking` for `actor` and return the resulting status.
///
/// | action     | from                | who                         | to        |
/// |------------|---------------------|-----------------------------|-----------|
/// | confirm    | pending             | the booking's provider      | confirmed |
/// | complete   | confirmed           | the booking's provider      | completed |
/// | cancel     | pending, confirmed  | the booking's patient       | cancelled |
/// | reschedule | pending, confirmed  | patient, provider or admin  | unchanged |
///
/// Anything else is `InvalidTransition`.
pub fn authorize(
    booking: &Booking,
    actor: &Actor,
    action: BookingAction,
) -> Result<BookingStatus, EngineError> {
    let is_provider = actor.role == Role::Doctor && actor.id == booking.doctor_id;
    let is_patient = actor.role == Role::Patient && actor.id == booking.patient_id;

    let next = match (action, booking.status) {
        (BookingAction::Confirm, BookingStatus::Pending) if is_provider => {
            Some(BookingStatus::Confirmed)
        }
        (BookingAction::Complete, BookingStatus::Confirmed) if is_provider => {
            Some(BookingStatus::Completed)
        }
        (BookingAction::Cancel, BookingStatus::Pending | BookingStatus::Confirmed) if is_patient => {
            Some(BookingStatus::Cancelled)
        }
        (BookingAction::Reschedule, status)
            if status.is_active() && (is_patient || is_provider || actor.role.is_admin()) =>
        {
            Some(status)
        }
        _ => None,
    };

    next.ok_or(EngineError::InvalidTransition {
        status: booking.status,
        action,
        role: actor.role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use ulid::Ulid;

    fn booking(status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            patient_id: Ulid::new(),
            doctor_id: Ulid::new(),
            chamber_id: Ulid::new(),
            facility_id: Ulid::new(),
            date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            duration_min: 60,
            span: Span::new(0, 3_600_000),
            service_type: "therapy".into(),
            notes: None,
            status,
            payment_status: PaymentStatus::Unpaid,
            created_by: Ulid::new(),
            cancelled_at: None,
            cancellation_reason: None,
        }
    }

    /// The actor with `role` who has the strongest claim on `b`.
    fn party(b: &Booking, role: Role) -> Actor {
        match role {
            Role::Patient => Actor::new(b.patient_id, role),
            Role::Doctor => Actor::new(b.doctor_id, role),
            _ => Actor::new(Ulid::new(), role),
        }
    }

    #[test]
    fn legal_transitions() {
        let p = booking(BookingStatus::Pending);
        let c = booking(BookingStatus::Confirmed);
        assert_eq!(authorize(&p, &party(&p, Role::Doctor), BookingAction::Confirm).unwrap(), BookingStatus::Confirmed);
        assert_eq!(authorize(&p, &party(&p, Role::Patient), BookingAction::Cancel).unwrap(), BookingStatus::Cancelled);
        assert_eq!(authorize(&c, &party(&c, Role::Patient), BookingAction::Cancel).unwrap(), BookingStatus::Cancelled);
        assert_eq!(authorize(&c, &party(&c, Role::Doctor), BookingAction::Complete).unwrap(), BookingStatus::Completed);
    }

    #[test]
    fn every_other_transition_is_rejected() {
        let legal = [
            (BookingStatus::Pending, BookingAction::Confirm, Role::Doctor),
            (BookingStatus::Pending, BookingAction::Cancel, Role::Patient),
            (BookingStatus::Confirmed, BookingAction::Cancel, Role::Patient),
            (BookingStatus::Confirmed, BookingAction::Complete, Role::Doctor),
        ];
        let state_changing = [BookingAction::Confirm, BookingAction::Cancel, BookingAction::Complete];

        for status in BookingStatus::ALL {
            for action in state_changing {
                for role in Role::ALL {
                    let b = booking(status);
                    let result = authorize(&b, &party(&b, role), action);
                    if legal.contains(&(status, action, role)) {
                        assert!(result.is_ok(), "{status} {action} {role} should be allowed");
                    } else {
                        assert!(
                            matches!(result, Err(EngineError::InvalidTransition { .. })),
                            "{status} {action} {role} should be rejected"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn strangers_with_the_right_role_are_rejected() {
        let p = booking(BookingStatus::Pending);
        let other_doctor = Actor::new(Ulid::new(), Role::Doctor);
        let other_patient = Actor::new(Ulid::new(), Role::Patient);
        assert!(authorize(&p, &other_doctor, BookingAction::Confirm).is_err());
        assert!(authorize(&p, &other_patient, BookingAction::Cancel).is_err());
    }

    #[test]
    fn admins_cannot_drive_lifecycle() {
        let p = booking(BookingStatus::Pending);
        let admin = Actor::new(Ulid::new(), Role::Admin);
        for action in [BookingAction::Confirm, BookingAction::Cancel, BookingAction::Complete] {
            assert!(authorize(&p, &admin, action).is_err());
        }
    }

    #[test]
    fn reschedule_keeps_status_and_needs_an_active_booking() {
        for status in BookingStatus::ALL {
            let b = booking(status);
            for role in Role::ALL {
                let result = authorize(&b, &party(&b, role), BookingAction::Reschedule);
                if status.is_active() {
                    assert_eq!(result.unwrap(), status);
                } else {
                    assert!(result.is_err());
                }
            }
        }
        let b = booking(BookingStatus::Pending);
        let stranger = Actor::new(Ulid::new(), Role::Patient);
        assert!(authorize(&b, &stranger, BookingAction::Reschedule).is_err());
    }
}
