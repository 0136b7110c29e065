use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::validate_date;
use super::status;
use super::{Engine, EngineError, SharedRoomState};

impl Engine {
    /// Derived view of a single cell: the stored row if one exists, else a
    /// pending overlay, else empty.
    pub async fn get_entry(
        &self,
        room_id: Ulid,
        date: NaiveDate,
        slot: SlotId,
    ) -> Result<CellView, EngineError> {
        validate_date(date)?;
        if !self.catalog.contains(slot) {
            return Err(EngineError::UnknownSlot(slot));
        }
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(status::derive_cell(&guard, &self.catalog, date, slot))
    }

    /// Full derived grid for an inclusive date range: every date crossed with
    /// the whole catalog (or one slot), empty cells included.
    pub async fn room_schedule(
        &self,
        room_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
        slot: Option<SlotId>,
    ) -> Result<Vec<ScheduleRow>, EngineError> {
        validate_date(from)?;
        validate_date(to)?;
        if from > to {
            return Err(EngineError::Validation("date range start after end"));
        }
        if (to - from).num_days() + 1 > MAX_QUERY_WINDOW_DAYS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        if let Some(s) = slot
            && !self.catalog.contains(s)
        {
            return Err(EngineError::UnknownSlot(s));
        }
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(status::grid_rows(&guard, &self.catalog, from, to, slot))
    }

    /// Registered rooms, optionally restricted to one building, sorted by id.
    pub async fn list_rooms(&self, building: Option<&str>) -> Vec<RoomInfo> {
        let mut rooms = Vec::with_capacity(self.state.len());
        for rs in self.room_snapshot() {
            let guard = rs.read().await;
            if building.is_some_and(|b| guard.building != b) {
                continue;
            }
            rooms.push(RoomInfo {
                id: guard.id,
                building: guard.building.clone(),
                name: guard.name.clone(),
            });
        }
        rooms.sort_by_key(|r| r.id);
        rooms
    }

    /// Scan the request log across all rooms. Results sort by request id;
    /// ULIDs are time-ordered, so this is creation order.
    pub async fn list_requests(&self, filter: &RequestFilter) -> Vec<RequestInfo> {
        let mut out = Vec::new();
        for rs in self.room_snapshot() {
            let guard = rs.read().await;
            for req in guard.requests.iter().filter(|r| filter.matches(r)) {
                out.push(request_info(guard.id, req));
            }
        }
        out.sort_by_key(|r| r.id);
        out
    }

    pub async fn get_request(&self, request_id: Ulid) -> Result<RequestInfo, EngineError> {
        let room_id = self
            .room_for_request(&request_id)
            .ok_or(EngineError::NotFound(request_id))?;
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        let req = guard
            .request(request_id)
            .ok_or(EngineError::NotFound(request_id))?;
        Ok(request_info(room_id, req))
    }

    /// Clone the room Arcs out of the map so callers can await per-room read
    /// locks without holding any DashMap shard lock.
    fn room_snapshot(&self) -> Vec<SharedRoomState> {
        self.state.iter().map(|e| e.value().clone()).collect()
    }
}

fn request_info(room_id: Ulid, req: &RequestRecord) -> RequestInfo {
    RequestInfo {
        id: req.id,
        room_id,
        building: req.building.clone(),
        requested_by: req.requested_by.clone(),
        requester_role: req.requester_role,
        base_date: req.base_date,
        start_slot: req.start_slot,
        end_slot: req.end_slot,
        weeks: req.weeks,
        status: req.status,
        course: req.course.clone(),
        note: req.note.clone(),
        created_at: req.created_at,
        reviewed_by: req.reviewed_by.clone(),
        reviewed_at: req.reviewed_at,
        review_note: req.review_note.clone(),
    }
}
