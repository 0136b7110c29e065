//! Recurrence expansion: turning a request's (base date, slot range, week
//! count) into the concrete grid cells it claims.
//!
//! Week-major order, catalog order within each week. Everything here is pure;
//! approval, conflict checks, and replay all call through these functions so
//! they cannot disagree about which cells a request owns.

use chrono::{Duration, NaiveDate};

use crate::catalog::SlotCatalog;
use crate::model::{CellKey, RequestRecord, SlotId};

/// Expand a weekly recurrence. Deterministic: identical inputs yield an
/// identical, identically ordered list. Unknown slot ids (rejected upstream)
/// expand to nothing.
pub fn expand_recurrence(
    catalog: &SlotCatalog,
    base_date: NaiveDate,
    start_slot: SlotId,
    end_slot: SlotId,
    weeks: u32,
) -> Vec<CellKey> {
    let Some(slots) = catalog.slot_ids_between(start_slot, end_slot) else {
        return Vec::new();
    };
    let mut cells = Vec::with_capacity(weeks as usize * slots.len());
    for w in 0..weeks {
        let date = base_date + Duration::days(7 * i64::from(w));
        for &slot in &slots {
            cells.push(CellKey::new(date, slot));
        }
    }
    cells
}

/// The cells a stored request record claims.
pub fn expand_request(catalog: &SlotCatalog, record: &RequestRecord) -> Vec<CellKey> {
    expand_recurrence(
        catalog,
        record.base_date,
        record.start_slot,
        record.end_slot,
        record.weeks,
    )
}

/// Arithmetic membership test: does `record` claim `(date, slot)`? The read
/// path uses this instead of materialising the expansion per cell.
pub fn request_covers(
    catalog: &SlotCatalog,
    record: &RequestRecord,
    date: NaiveDate,
    slot: SlotId,
) -> bool {
    let delta = (date - record.base_date).num_days();
    if delta < 0 || delta % 7 != 0 {
        return false;
    }
    if delta / 7 >= i64::from(record.weeks) {
        return false;
    }
    catalog.range_contains(record.start_slot, record.end_slot, slot)
}
