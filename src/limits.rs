//! Hard bounds enforced by the engine. Exceeding one is a caller error
//! (`Validation` or `LimitExceeded`), never a panic.

/// Rooms a single tenant may register.
pub const MAX_ROOMS_PER_TENANT: usize = 10_000;

/// Room name / building name length in bytes.
pub const MAX_NAME_LEN: usize = 128;

/// Course titles, booked-by identifiers, and review notes.
pub const MAX_LABEL_LEN: usize = 256;

/// Longest recurrence a single request may claim.
pub const MAX_REQUEST_WEEKS: u32 = 12;

/// Stored occupancy rows per room. A full year of a ten-slot catalog
/// is ~3 650 rows, so this is generous headroom.
pub const MAX_ENTRIES_PER_ROOM: usize = 100_000;

/// Request records retained per room (history is never pruned).
pub const MAX_REQUESTS_PER_ROOM: usize = 100_000;

/// Slots a catalog file may define.
pub const MAX_SLOTS: usize = 64;

/// Calendar years the engine accepts for base dates and entry dates.
pub const MIN_VALID_YEAR: i32 = 2000;
pub const MAX_VALID_YEAR: i32 = 2100;

/// Widest date range a schedule query may scan, inclusive.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 92;

pub const MAX_TENANT_NAME_LEN: usize = 64;
pub const MAX_TENANTS: usize = 64;
