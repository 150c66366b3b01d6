//! Input bounds enforced by the engine before any state is touched.

/// Shortest bookable session, in minutes.
pub const MIN_DURATION_MIN: u32 = 15;

/// Longest bookable session, in minutes (8 hours).
pub const MAX_DURATION_MIN: u32 = 480;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_SERVICE_TYPE_LEN: usize = 128;
pub const MAX_NOTES_LEN: usize = 2_000;
pub const MAX_REASON_LEN: usize = 500;
pub const MAX_EQUIPMENT_TAGS: usize = 64;
pub const MAX_PREFERRED_CHAMBERS: usize = 64;

/// Widest date range a provider or chamber projection may cover.
pub const MAX_PROJECTION_DAYS: i64 = 366;
