//! Derived cell status — the read side of the schedule.
//!
//! A stored row always wins. A cell with no row shows `pending` when at
//! least one pending request covers it and `empty` otherwise. `pending` is
//! never stored: it re-derives from the live request set on every read, so
//! rejecting a request (which touches no rows) makes its cells empty again
//! with no cleanup pass.

use chrono::{Duration, NaiveDate};

use crate::catalog::SlotCatalog;
use crate::model::*;

use super::recurrence::request_covers;

/// Derive the view of a single cell.
pub(crate) fn derive_cell(
    rs: &RoomState,
    catalog: &SlotCatalog,
    date: NaiveDate,
    slot: SlotId,
) -> CellView {
    if let Some(entry) = rs.entry(&CellKey::new(date, slot)) {
        let status = match entry.status {
            EntryStatus::Occupied => CellStatus::Occupied,
            EntryStatus::Maintenance => CellStatus::Maintenance,
        };
        return CellView {
            status,
            course: entry.course.clone(),
            booked_by: entry.booked_by.clone(),
            request_id: entry.request_id,
        };
    }
    // Requests are stored in creation order, so the first pending hit is the
    // earliest-queued claim on this cell.
    if let Some(req) = rs
        .requests
        .iter()
        .find(|r| r.status == RequestStatus::Pending && request_covers(catalog, r, date, slot))
    {
        return CellView {
            status: CellStatus::Pending,
            course: req.course.clone(),
            booked_by: Some(req.requested_by.clone()),
            request_id: Some(req.id),
        };
    }
    CellView::empty()
}

/// Assemble the derived grid for an inclusive date range: every date crossed
/// with the whole catalog (or one slot), ordered date-major, catalog order
/// within a date. Empty cells are included so callers can render directly.
pub(crate) fn grid_rows(
    rs: &RoomState,
    catalog: &SlotCatalog,
    from: NaiveDate,
    to: NaiveDate,
    slot: Option<SlotId>,
) -> Vec<ScheduleRow> {
    let mut rows = Vec::new();
    let mut date = from;
    while date <= to {
        match slot {
            Some(s) => rows.push(row_for(rs, catalog, date, s)),
            None => {
                for ts in catalog.all() {
                    rows.push(row_for(rs, catalog, date, ts.id));
                }
            }
        }
        date += Duration::days(1);
    }
    rows
}

fn row_for(rs: &RoomState, catalog: &SlotCatalog, date: NaiveDate, slot: SlotId) -> ScheduleRow {
    let cell = derive_cell(rs, catalog, date, slot);
    ScheduleRow {
        date,
        slot,
        status: cell.status,
        course: cell.course,
        booked_by: cell.booked_by,
        request_id: cell.request_id,
    }
}
