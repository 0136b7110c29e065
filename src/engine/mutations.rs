use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::room_channel;

use super::conflict::{check_cells_free, now_ms, validate_date, validate_recurrence};
use super::recurrence::{expand_recurrence, expand_request};
use super::{Engine, EngineError, WalCommand};

fn check_label(value: &str, what: &'static str) -> Result<(), EngineError> {
    if value.len() > MAX_LABEL_LEN {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

fn check_opt_label(value: &Option<String>, what: &'static str) -> Result<(), EngineError> {
    if let Some(v) = value {
        check_label(v, what)?;
    }
    Ok(())
}

impl Engine {
    pub async fn create_room(
        &self,
        id: Ulid,
        building: String,
        name: String,
    ) -> Result<(), EngineError> {
        if self.state.len() >= MAX_ROOMS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if building.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("building name too long"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("room name too long"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::RoomCreated {
            id,
            building: building.clone(),
            name: name.clone(),
        };
        self.wal_append(&event).await?;
        let rs = RoomState::new(id, building, name);
        self.state.insert(id, Arc::new(RwLock::new(rs)));
        self.notify.send(&room_channel(id), &event);
        Ok(())
    }

    pub async fn update_room(
        &self,
        id: Ulid,
        building: Option<String>,
        name: Option<String>,
    ) -> Result<(), EngineError> {
        if building.is_none() && name.is_none() {
            return Err(EngineError::Validation("no fields to update"));
        }
        if let Some(ref b) = building
            && b.len() > MAX_NAME_LEN
        {
            return Err(EngineError::LimitExceeded("building name too long"));
        }
        if let Some(ref n) = name
            && n.len() > MAX_NAME_LEN
        {
            return Err(EngineError::LimitExceeded("room name too long"));
        }
        let rs = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;

        let event = Event::RoomUpdated {
            id,
            building: building.unwrap_or_else(|| guard.building.clone()),
            name: name.unwrap_or_else(|| guard.name.clone()),
        };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    /// Remove a room from the registry. Refused while any request is still
    /// pending; closed request history goes with the room.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let rs = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        if guard
            .requests
            .iter()
            .any(|r| r.status == RequestStatus::Pending)
        {
            return Err(EngineError::Validation("room has pending requests"));
        }
        let request_ids: Vec<Ulid> = guard.requests.iter().map(|r| r.id).collect();
        drop(guard);

        let event = Event::RoomDeleted { id };
        self.wal_append(&event).await?;
        self.state.remove(&id);
        for rid in request_ids {
            self.request_to_room.remove(&rid);
        }
        self.notify.send(&room_channel(id), &event);
        self.notify.remove(&room_channel(id));
        Ok(())
    }

    /// Direct administrative write. Overwrites whatever is stored, including
    /// rows owned by an approved request — the override always wins and the
    /// old row's back-reference is dropped with it.
    pub async fn set_entry(
        &self,
        room_id: Ulid,
        date: NaiveDate,
        slot: SlotId,
        status: EntryStatus,
        course: Option<String>,
        booked_by: Option<String>,
    ) -> Result<(), EngineError> {
        validate_date(date)?;
        if !self.catalog.contains(slot) {
            return Err(EngineError::UnknownSlot(slot));
        }
        check_opt_label(&course, "course too long")?;
        check_opt_label(&booked_by, "booked_by too long")?;
        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let mut guard = rs.write().await;
        let key = CellKey::new(date, slot);
        if guard.entries.len() >= MAX_ENTRIES_PER_ROOM && !guard.entries.contains_key(&key) {
            return Err(EngineError::LimitExceeded("too many entries on room"));
        }

        let event = Event::EntrySet {
            room_id,
            date,
            slot,
            status,
            course,
            booked_by,
        };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    /// Idempotent removal: clearing an already-empty cell is success and
    /// writes nothing.
    pub async fn clear_entry(
        &self,
        room_id: Ulid,
        date: NaiveDate,
        slot: SlotId,
    ) -> Result<(), EngineError> {
        validate_date(date)?;
        if !self.catalog.contains(slot) {
            return Err(EngineError::UnknownSlot(slot));
        }
        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let mut guard = rs.write().await;
        if !guard.entries.contains_key(&CellKey::new(date, slot)) {
            return Ok(());
        }

        let event = Event::EntryCleared {
            room_id,
            date,
            slot,
        };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    /// Submit a booking request. Conflict-checks the full expansion against
    /// stored rows, but writes no schedule entries — the request is stored
    /// pending and only approval materialises occupancy.
    pub async fn create_request(&self, req: NewRequest) -> Result<(), EngineError> {
        if !req.requester_role.may_request() {
            return Err(EngineError::Validation("role may not submit requests"));
        }
        check_label(&req.requested_by, "requested_by too long")?;
        check_opt_label(&req.course, "course too long")?;
        check_opt_label(&req.note, "note too long")?;
        validate_date(req.base_date)?;
        validate_recurrence(&self.catalog, req.start_slot, req.end_slot, req.weeks)?;
        if self.request_to_room.contains_key(&req.id) {
            return Err(EngineError::AlreadyExists(req.id));
        }
        let rs = self
            .get_room(&req.room_id)
            .ok_or(EngineError::NotFound(req.room_id))?;
        let mut guard = rs.write().await;
        if guard.requests.len() >= MAX_REQUESTS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many requests on room"));
        }

        let cells = expand_recurrence(
            &self.catalog,
            req.base_date,
            req.start_slot,
            req.end_slot,
            req.weeks,
        );
        check_cells_free(&guard, &cells)?;

        let event = Event::RequestCreated {
            id: req.id,
            room_id: req.room_id,
            requested_by: req.requested_by,
            requester_role: req.requester_role,
            building: guard.building.clone(),
            base_date: req.base_date,
            start_slot: req.start_slot,
            end_slot: req.end_slot,
            weeks: req.weeks,
            course: req.course,
            note: req.note,
            created_at: now_ms(),
        };
        self.persist_and_apply(req.room_id, &mut guard, &event).await
    }

    /// Approve a pending request. Re-validates the expansion under the room
    /// write lock, so the check and the cell writes are one atomic step; on
    /// conflict the request stays pending and nothing changes.
    pub async fn approve_request(
        &self,
        id: Ulid,
        reviewed_by: String,
        reviewer_role: Role,
    ) -> Result<(), EngineError> {
        if !reviewer_role.may_review() {
            return Err(EngineError::Validation("role may not review requests"));
        }
        check_label(&reviewed_by, "reviewed_by too long")?;
        let (room_id, mut guard) = self.resolve_request_write(&id).await?;
        let record = guard.request(id).ok_or(EngineError::NotFound(id))?;
        if record.status != RequestStatus::Pending {
            return Err(EngineError::InvalidState {
                request: id,
                status: record.status,
            });
        }
        let cells = expand_request(&self.catalog, record);
        check_cells_free(&guard, &cells)?;
        if guard.entries.len() + cells.len() > MAX_ENTRIES_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many entries on room"));
        }

        let event = Event::RequestApproved {
            id,
            room_id,
            reviewed_by,
            reviewed_at: now_ms(),
        };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    /// Reject a pending request. Touches no schedule entries — nothing was
    /// ever stored for it.
    pub async fn reject_request(
        &self,
        id: Ulid,
        reviewed_by: String,
        reviewer_role: Role,
        note: Option<String>,
    ) -> Result<(), EngineError> {
        if !reviewer_role.may_review() {
            return Err(EngineError::Validation("role may not review requests"));
        }
        check_label(&reviewed_by, "reviewed_by too long")?;
        check_opt_label(&note, "note too long")?;
        let (room_id, mut guard) = self.resolve_request_write(&id).await?;
        let record = guard.request(id).ok_or(EngineError::NotFound(id))?;
        if record.status != RequestStatus::Pending {
            return Err(EngineError::InvalidState {
                request: id,
                status: record.status,
            });
        }

        let event = Event::RequestRejected {
            id,
            room_id,
            reviewed_by,
            reviewed_at: now_ms(),
            note,
        };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    /// Undo an approval. Clears exactly the rows still back-referencing this
    /// request; cells overwritten by an administrative write stay put.
    pub async fn revert_request(
        &self,
        id: Ulid,
        reviewed_by: String,
        reviewer_role: Role,
        note: Option<String>,
    ) -> Result<(), EngineError> {
        if !reviewer_role.may_review() {
            return Err(EngineError::Validation("role may not review requests"));
        }
        check_label(&reviewed_by, "reviewed_by too long")?;
        check_opt_label(&note, "note too long")?;
        let (room_id, mut guard) = self.resolve_request_write(&id).await?;
        let record = guard.request(id).ok_or(EngineError::NotFound(id))?;
        if record.status != RequestStatus::Approved {
            return Err(EngineError::InvalidState {
                request: id,
                status: record.status,
            });
        }

        let event = Event::RequestReverted {
            id,
            room_id,
            reviewed_by,
            reviewed_at: now_ms(),
            note,
        };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate current state: each room, its requests in creation order,
    /// review transitions in review-time order, then a reconciliation diff
    /// covering administrative overrides and deletions.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let mut room_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        room_ids.sort();

        for room_id in room_ids {
            let Some(rs) = self.get_room(&room_id) else { continue };
            let guard = rs.read().await;

            events.push(Event::RoomCreated {
                id: guard.id,
                building: guard.building.clone(),
                name: guard.name.clone(),
            });

            for req in &guard.requests {
                events.push(Event::RequestCreated {
                    id: req.id,
                    room_id: guard.id,
                    requested_by: req.requested_by.clone(),
                    requester_role: req.requester_role,
                    building: req.building.clone(),
                    base_date: req.base_date,
                    start_slot: req.start_slot,
                    end_slot: req.end_slot,
                    weeks: req.weeks,
                    course: req.course.clone(),
                    note: req.note.clone(),
                    created_at: req.created_at,
                });
            }

            // Reviewed requests, replayed in review order so later approvals
            // reclaim cells freed by earlier reversions exactly as they did
            // live. The simulation mirrors what replay will produce; the
            // diff against actual entries repairs everything else (direct
            // writes, clears, overridden rows).
            let mut reviewed: Vec<&RequestRecord> = guard
                .requests
                .iter()
                .filter(|r| r.reviewed_at.is_some())
                .collect();
            reviewed.sort_by_key(|r| (r.reviewed_at, r.id));

            let mut sim: BTreeMap<CellKey, StoredEntry> = BTreeMap::new();
            for req in reviewed {
                let reviewed_by = req.reviewed_by.clone().unwrap_or_default();
                let reviewed_at = req.reviewed_at.unwrap_or_default();
                match req.status {
                    RequestStatus::Approved => {
                        events.push(Event::RequestApproved {
                            id: req.id,
                            room_id: guard.id,
                            reviewed_by,
                            reviewed_at,
                        });
                        for cell in expand_request(&self.catalog, req) {
                            sim.insert(
                                cell,
                                StoredEntry {
                                    status: EntryStatus::Occupied,
                                    course: req.course.clone(),
                                    booked_by: Some(req.requested_by.clone()),
                                    request_id: Some(req.id),
                                },
                            );
                        }
                    }
                    RequestStatus::Rejected => {
                        events.push(Event::RequestRejected {
                            id: req.id,
                            room_id: guard.id,
                            reviewed_by,
                            reviewed_at,
                            note: req.review_note.clone(),
                        });
                    }
                    RequestStatus::Reverted => {
                        events.push(Event::RequestReverted {
                            id: req.id,
                            room_id: guard.id,
                            reviewed_by,
                            reviewed_at,
                            note: req.review_note.clone(),
                        });
                        for cell in expand_request(&self.catalog, req) {
                            if sim.get(&cell).is_some_and(|e| e.request_id == Some(req.id)) {
                                sim.remove(&cell);
                            }
                        }
                    }
                    RequestStatus::Pending => {}
                }
            }

            for key in sim.keys() {
                if !guard.entries.contains_key(key) {
                    events.push(Event::EntryCleared {
                        room_id: guard.id,
                        date: key.date,
                        slot: key.slot,
                    });
                }
            }
            for (key, entry) in &guard.entries {
                if sim.get(key) != Some(entry) {
                    events.push(Event::EntrySet {
                        room_id: guard.id,
                        date: key.date,
                        slot: key.slot,
                        status: entry.status,
                        course: entry.course.clone(),
                        booked_by: entry.booked_by.clone(),
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
