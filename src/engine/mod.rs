mod conflict;
mod error;
mod mutations;
mod queries;
mod recurrence;
mod status;

pub use error::EngineError;
pub use recurrence::{expand_recurrence, expand_request, request_covers};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::catalog::SlotCatalog;
use crate::model::*;
use crate::notify::{room_channel, NotifyHub, REQUESTS_CHANNEL};
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
    result: &io::Result<()>,
) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

pub struct Engine {
    pub state: DashMap<Ulid, SharedRoomState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Fixed slot catalog shared across tenants.
    pub catalog: Arc<SlotCatalog>,
    /// Reverse lookup: request id → room id.
    pub(super) request_to_room: DashMap<Ulid, Ulid>,
}

/// Apply an event directly to a RoomState (no locking — caller holds the
/// lock). Unconditional: all validation happened before the event was
/// written, so live application and replay take exactly the same path.
fn apply_to_room(
    rs: &mut RoomState,
    event: &Event,
    catalog: &SlotCatalog,
    request_map: &DashMap<Ulid, Ulid>,
) {
    match event {
        Event::EntrySet {
            date,
            slot,
            status,
            course,
            booked_by,
            ..
        } => {
            // Direct writes always win; any request back-reference on the
            // old row is dropped with it.
            rs.set_entry(
                CellKey::new(*date, *slot),
                StoredEntry {
                    status: *status,
                    course: course.clone(),
                    booked_by: booked_by.clone(),
                    request_id: None,
                },
            );
        }
        Event::EntryCleared { date, slot, .. } => {
            rs.clear_entry(&CellKey::new(*date, *slot));
        }
        Event::RequestCreated {
            id,
            room_id,
            requested_by,
            requester_role,
            building,
            base_date,
            start_slot,
            end_slot,
            weeks,
            course,
            note,
            created_at,
        } => {
            rs.push_request(RequestRecord {
                id: *id,
                requested_by: requested_by.clone(),
                requester_role: *requester_role,
                building: building.clone(),
                base_date: *base_date,
                start_slot: *start_slot,
                end_slot: *end_slot,
                weeks: *weeks,
                course: course.clone(),
                note: note.clone(),
                status: RequestStatus::Pending,
                created_at: *created_at,
                reviewed_by: None,
                reviewed_at: None,
                review_note: None,
            });
            request_map.insert(*id, *room_id);
        }
        Event::RequestApproved {
            id,
            reviewed_by,
            reviewed_at,
            ..
        } => {
            let Some(req) = rs.request_mut(*id) else { return };
            req.status = RequestStatus::Approved;
            req.reviewed_by = Some(reviewed_by.clone());
            req.reviewed_at = Some(*reviewed_at);
            let course = req.course.clone();
            let booked_by = req.requested_by.clone();
            let cells = recurrence::expand_request(catalog, req);
            for cell in cells {
                rs.set_entry(
                    cell,
                    StoredEntry {
                        status: EntryStatus::Occupied,
                        course: course.clone(),
                        booked_by: Some(booked_by.clone()),
                        request_id: Some(*id),
                    },
                );
            }
        }
        Event::RequestRejected {
            id,
            reviewed_by,
            reviewed_at,
            note,
            ..
        } => {
            let Some(req) = rs.request_mut(*id) else { return };
            req.status = RequestStatus::Rejected;
            req.reviewed_by = Some(reviewed_by.clone());
            req.reviewed_at = Some(*reviewed_at);
            req.review_note = note.clone();
            // Nothing was ever stored for a pending request; no rows to touch.
        }
        Event::RequestReverted {
            id,
            reviewed_by,
            reviewed_at,
            note,
            ..
        } => {
            let Some(req) = rs.request_mut(*id) else { return };
            req.status = RequestStatus::Reverted;
            req.reviewed_by = Some(reviewed_by.clone());
            req.reviewed_at = Some(*reviewed_at);
            req.review_note = note.clone();
            let cells = recurrence::expand_request(catalog, req);
            // Clear only rows still owned by this request. Cells overwritten
            // by a direct administrative write stay as the admin left them.
            for cell in cells {
                if rs.entry(&cell).is_some_and(|e| e.request_id == Some(*id)) {
                    rs.clear_entry(&cell);
                }
            }
        }
        Event::RoomUpdated { building, name, .. } => {
            rs.building = building.clone();
            rs.name = name.clone();
        }
        // RoomCreated/Deleted are handled at the DashMap level, not here
        Event::RoomCreated { .. } | Event::RoomDeleted { .. } => {}
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        catalog: Arc<SlotCatalog>,
    ) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            catalog,
            request_to_room: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_read/
        // try_write always succeed instantly (no contention). Never use
        // blocking_read/blocking_write here because this may run inside an
        // async context (e.g. lazy tenant creation).
        for event in &events {
            match event {
                Event::RoomCreated { id, building, name } => {
                    let rs = RoomState::new(*id, building.clone(), name.clone());
                    engine.state.insert(*id, Arc::new(RwLock::new(rs)));
                }
                Event::RoomDeleted { id } => {
                    if let Some(entry) = engine.state.get(id) {
                        let rs = entry.try_read().expect("replay: uncontended read");
                        for req in &rs.requests {
                            engine.request_to_room.remove(&req.id);
                        }
                    }
                    engine.state.remove(id);
                }
                other => {
                    let room_id = event_room_id(other);
                    if let Some(room_id) = room_id
                        && let Some(entry) = engine.state.get(&room_id)
                    {
                        let rs_arc = entry.clone();
                        let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                        apply_to_room(&mut guard, other, &engine.catalog, &engine.request_to_room);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn room_for_request(&self, request_id: &Ulid) -> Option<Ulid> {
        self.request_to_room.get(request_id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call. The room channel always gets
    /// the event; request lifecycle events also fan out to `requests`.
    pub(super) async fn persist_and_apply(
        &self,
        room_id: Ulid,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_room(rs, event, &self.catalog, &self.request_to_room);
        self.notify.send(&room_channel(room_id), event);
        if event.is_request_event() {
            self.notify.send(REQUESTS_CHANNEL, event);
        }
        Ok(())
    }

    /// Lookup request → room, get room, acquire write lock.
    pub(super) async fn resolve_request_write(
        &self,
        request_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<RoomState>), EngineError> {
        let room_id = self
            .room_for_request(request_id)
            .ok_or(EngineError::NotFound(*request_id))?;
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.write_owned().await;
        Ok((room_id, guard))
    }
}

/// Extract the room id from an event (for non-Create/Delete events).
fn event_room_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::EntrySet { room_id, .. }
        | Event::EntryCleared { room_id, .. }
        | Event::RequestCreated { room_id, .. }
        | Event::RequestApproved { room_id, .. }
        | Event::RequestRejected { room_id, .. }
        | Event::RequestReverted { room_id, .. } => Some(*room_id),
        Event::RoomUpdated { id, .. } => Some(*id),
        Event::RoomCreated { .. } | Event::RoomDeleted { .. } => None,
    }
}
