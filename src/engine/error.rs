use ulid::Ulid;

use crate::model::{BookingStatus, ChamberStatus, Role};

use super::BookingAction;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    /// Implicit assignment found no free chamber for the window.
    #[error("no chamber available for the requested window")]
    NoAvailableChamber,
    /// The window overlaps an active booking on the same chamber or provider.
    #[error("conflict with booking: {0}")]
    ConflictDetected(Ulid),
    #[error("chamber {chamber} is {status}")]
    ChamberUnavailable { chamber: Ulid, status: ChamberStatus },
    /// Illegal from the booking's current status, or not permitted for the caller.
    #[error("cannot {action} a {status} booking as {role}")]
    InvalidTransition {
        status: BookingStatus,
        action: BookingAction,
        role: Role,
    },
    #[error("invalid input: {0}")]
    Validation(&'static str),
    /// The log append failed; nothing was applied. Safe to retry.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Persistence(e.to_string())
    }
}
