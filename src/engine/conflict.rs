use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// True if `proposed` overlaps any of `existing`. Every window is tested;
/// windows that merely touch `proposed` do not conflict.
pub fn has_conflict(existing: &[Span], proposed: &Span) -> bool {
    existing.iter().any(|w| w.overlaps(proposed))
}

/// Active bookings overlapping `proposed`, skipping `exclude` (a booking being
/// edited in place must not conflict with its own prior window).
pub(crate) fn conflicting<'a>(
    bookings: impl IntoIterator<Item = &'a Booking>,
    proposed: &Span,
    exclude: Option<Ulid>,
) -> impl Iterator<Item = &'a Booking> {
    let proposed = *proposed;
    bookings.into_iter().filter(move |b| {
        b.status.is_active() && Some(b.id) != exclude && b.span.overlaps(&proposed)
    })
}

/// Reject the window if any active booking in `bookings` overlaps it.
pub(crate) fn check_no_conflict<'a>(
    bookings: impl IntoIterator<Item = &'a Booking>,
    proposed: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match conflicting(bookings, proposed, exclude).next() {
        Some(hit) => {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            Err(EngineError::ConflictDetected(hit.id))
        }
        None => Ok(()),
    }
}

pub(crate) fn validate_duration(duration_min: u32) -> Result<(), EngineError> {
    if !(MIN_DURATION_MIN..=MAX_DURATION_MIN).contains(&duration_min) {
        return Err(EngineError::Validation("duration must be between 15 and 480 minutes"));
    }
    Ok(())
}

/// Reject caller-built windows that are empty or inverted; they overlap nothing.
pub(crate) fn validate_window(window: &Span) -> Result<(), EngineError> {
    if window.start >= window.end {
        return Err(EngineError::Validation("window must end after it starts"));
    }
    Ok(())
}

/// `[date start_time, + duration)` as a UTC span.
pub fn booking_window(
    date: NaiveDate,
    start_time: NaiveTime,
    duration_min: u32,
) -> Result<Span, EngineError> {
    validate_duration(duration_min)?;
    let start = date.and_time(start_time).and_utc().timestamp_millis();
    Ok(Span::new(start, start + Ms::from(duration_min) * MINUTE_MS))
}

/// The UTC calendar day `[00:00, 24:00)` containing `date`.
pub fn day_span(date: NaiveDate) -> Span {
    let start = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
    Span::new(start, start + DAY_MS)
}

/// The UTC calendar date containing instant `t`.
pub(crate) fn date_of(t: Ms) -> NaiveDate {
    chrono::DateTime::from_timestamp_millis(t)
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

pub(crate) fn validate_text(
    value: Option<&str>,
    max: usize,
    what: &'static str,
) -> Result<(), EngineError> {
    match value {
        Some(v) if v.len() > max => Err(EngineError::Validation(what)),
        _ => Ok(()),
    }
}
