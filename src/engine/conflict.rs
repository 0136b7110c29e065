use chrono::Datelike;

use crate::catalog::SlotCatalog;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Reject dates outside the supported calendar window.
pub(crate) fn validate_date(date: chrono::NaiveDate) -> Result<(), EngineError> {
    use crate::limits::*;
    if date.year() < MIN_VALID_YEAR || date.year() > MAX_VALID_YEAR {
        return Err(EngineError::Validation("date outside supported years"));
    }
    Ok(())
}

/// Validate a recurrence shape: both slots known, start at or before end in
/// catalog order, week count in bounds.
pub(crate) fn validate_recurrence(
    catalog: &SlotCatalog,
    start_slot: SlotId,
    end_slot: SlotId,
    weeks: u32,
) -> Result<(), EngineError> {
    use crate::limits::*;
    let sp = catalog
        .position(start_slot)
        .ok_or(EngineError::UnknownSlot(start_slot))?;
    let ep = catalog
        .position(end_slot)
        .ok_or(EngineError::UnknownSlot(end_slot))?;
    if sp > ep {
        return Err(EngineError::Validation("start slot sorts after end slot"));
    }
    if weeks < 1 || weeks > MAX_REQUEST_WEEKS {
        return Err(EngineError::Validation("week count out of range"));
    }
    Ok(())
}

/// Cells already blocked by a stored entry, preserving the order given.
/// Occupied and maintenance both block. Pending requests are never stored,
/// so they never surface here: a pending request only blocks a second
/// *approval*, because the first approval materialises occupied rows.
pub(crate) fn find_conflicts(rs: &RoomState, cells: &[CellKey]) -> Vec<CellKey> {
    cells
        .iter()
        .filter(|c| rs.entries.contains_key(c))
        .copied()
        .collect()
}

/// Availability check for a candidate expansion: Ok when every cell is free
/// of stored entries, otherwise Conflict carrying the full blocked list.
pub(crate) fn check_cells_free(rs: &RoomState, cells: &[CellKey]) -> Result<(), EngineError> {
    let conflicts = find_conflicts(rs, cells);
    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Conflict { cells: conflicts })
    }
}
