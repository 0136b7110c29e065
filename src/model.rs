use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ulid::Ulid;

/// Unix milliseconds — audit timestamps (creation, review).
/// Calendar positions use `NaiveDate`; the two never mix.
pub type Ms = i64;

/// Identifier of a slot in the catalog. Stable across restarts; the catalog
/// is fixed reference data, so a plain integer is enough.
pub type SlotId = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotCategory {
    /// Teaching periods.
    Classroom,
    /// Office hours, meetings, facility blocks.
    Administrative,
}

impl SlotCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotCategory::Classroom => "classroom",
            SlotCategory::Administrative => "administrative",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "classroom" => Some(SlotCategory::Classroom),
            "administrative" => Some(SlotCategory::Administrative),
            _ => None,
        }
    }
}

/// Who is acting. Roles arrive with each call; the engine stores them on
/// request records but holds no accounts of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    BuildingManager,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::BuildingManager => "building_manager",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "building_manager" => Some(Role::BuildingManager),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }
    }

    /// Roles allowed to submit booking requests.
    pub fn may_request(&self) -> bool {
        matches!(self, Role::Teacher | Role::Student)
    }

    /// Roles allowed to approve, reject, or revert requests.
    pub fn may_review(&self) -> bool {
        matches!(self, Role::Admin | Role::BuildingManager)
    }
}

/// What a stored schedule row means. `pending` and `empty` are derived at
/// read time and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Occupied,
    Maintenance,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Occupied => "occupied",
            EntryStatus::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "occupied" => Some(EntryStatus::Occupied),
            "maintenance" => Some(EntryStatus::Maintenance),
            _ => None,
        }
    }
}

/// Derived status of a cell as readers see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    Empty,
    Occupied,
    Maintenance,
    Pending,
}

impl CellStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellStatus::Empty => "empty",
            CellStatus::Occupied => "occupied",
            CellStatus::Maintenance => "maintenance",
            CellStatus::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Reverted,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Reverted => "reverted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "approved" => Some(RequestStatus::Approved),
            "rejected" => Some(RequestStatus::Rejected),
            "reverted" => Some(RequestStatus::Reverted),
            _ => None,
        }
    }
}

/// One cell of the schedule grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub date: NaiveDate,
    pub slot: SlotId,
}

impl CellKey {
    pub fn new(date: NaiveDate, slot: SlotId) -> Self {
        Self { date, slot }
    }
}

/// A stored occupancy row. Absence of a row means the cell is empty (or
/// pending, if a pending request covers it — see the status derivation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub status: EntryStatus,
    pub course: Option<String>,
    pub booked_by: Option<String>,
    /// Set when the row was written by an approval; direct administrative
    /// writes leave it `None`. Reversion only clears rows still carrying it.
    pub request_id: Option<Ulid>,
}

/// A booking request and its review history. Records are append-only:
/// rejected and reverted requests stay in the room's log forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: Ulid,
    pub requested_by: String,
    pub requester_role: Role,
    /// Copied from the room at creation; later renames don't rewrite history.
    pub building: String,
    pub base_date: NaiveDate,
    pub start_slot: SlotId,
    pub end_slot: SlotId,
    pub weeks: u32,
    pub course: Option<String>,
    pub note: Option<String>,
    pub status: RequestStatus,
    pub created_at: Ms,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<Ms>,
    pub review_note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub building: String,
    pub name: String,
    /// Stored occupancy rows keyed by (date, slot).
    pub entries: BTreeMap<CellKey, StoredEntry>,
    /// Every request ever targeting this room, in creation order.
    pub requests: Vec<RequestRecord>,
}

impl RoomState {
    pub fn new(id: Ulid, building: String, name: String) -> Self {
        Self {
            id,
            building,
            name,
            entries: BTreeMap::new(),
            requests: Vec::new(),
        }
    }

    pub fn entry(&self, key: &CellKey) -> Option<&StoredEntry> {
        self.entries.get(key)
    }

    pub fn set_entry(&mut self, key: CellKey, entry: StoredEntry) {
        self.entries.insert(key, entry);
    }

    /// Returns true if a row was actually removed.
    pub fn clear_entry(&mut self, key: &CellKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn request(&self, id: Ulid) -> Option<&RequestRecord> {
        self.requests.iter().find(|r| r.id == id)
    }

    pub fn request_mut(&mut self, id: Ulid) -> Option<&mut RequestRecord> {
        self.requests.iter_mut().find(|r| r.id == id)
    }

    pub fn push_request(&mut self, record: RequestRecord) {
        self.requests.push(record);
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        building: String,
        name: String,
    },
    RoomUpdated {
        id: Ulid,
        building: String,
        name: String,
    },
    RoomDeleted {
        id: Ulid,
    },
    EntrySet {
        room_id: Ulid,
        date: NaiveDate,
        slot: SlotId,
        status: EntryStatus,
        course: Option<String>,
        booked_by: Option<String>,
    },
    EntryCleared {
        room_id: Ulid,
        date: NaiveDate,
        slot: SlotId,
    },
    RequestCreated {
        id: Ulid,
        room_id: Ulid,
        requested_by: String,
        requester_role: Role,
        building: String,
        base_date: NaiveDate,
        start_slot: SlotId,
        end_slot: SlotId,
        weeks: u32,
        course: Option<String>,
        note: Option<String>,
        created_at: Ms,
    },
    RequestApproved {
        id: Ulid,
        room_id: Ulid,
        reviewed_by: String,
        reviewed_at: Ms,
    },
    RequestRejected {
        id: Ulid,
        room_id: Ulid,
        reviewed_by: String,
        reviewed_at: Ms,
        note: Option<String>,
    },
    RequestReverted {
        id: Ulid,
        room_id: Ulid,
        reviewed_by: String,
        reviewed_at: Ms,
        note: Option<String>,
    },
}

impl Event {
    /// Request lifecycle events also fan out to the global `requests` channel.
    pub fn is_request_event(&self) -> bool {
        matches!(
            self,
            Event::RequestCreated { .. }
                | Event::RequestApproved { .. }
                | Event::RequestRejected { .. }
                | Event::RequestReverted { .. }
        )
    }
}

/// Input to request creation, exactly as supplied by the caller. The engine
/// stamps status, building, and the creation timestamp itself.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub id: Ulid,
    pub room_id: Ulid,
    pub requested_by: String,
    pub requester_role: Role,
    pub base_date: NaiveDate,
    pub start_slot: SlotId,
    pub end_slot: SlotId,
    pub weeks: u32,
    pub course: Option<String>,
    pub note: Option<String>,
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub building: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub id: Ulid,
    pub room_id: Ulid,
    pub building: String,
    pub requested_by: String,
    pub requester_role: Role,
    pub base_date: NaiveDate,
    pub start_slot: SlotId,
    pub end_slot: SlotId,
    pub weeks: u32,
    pub status: RequestStatus,
    pub course: Option<String>,
    pub note: Option<String>,
    pub created_at: Ms,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<Ms>,
    pub review_note: Option<String>,
}

/// Status predicate for request queries. `Not` lets one query fetch the
/// historical set (everything that has left `pending`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Is(RequestStatus),
    Not(RequestStatus),
}

impl StatusFilter {
    pub fn matches(&self, status: RequestStatus) -> bool {
        match self {
            StatusFilter::Is(s) => status == *s,
            StatusFilter::Not(s) => status != *s,
        }
    }
}

/// Conjunctive filter over the request log. `None` fields match everything;
/// the date bounds apply to the request's base date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub status: Option<StatusFilter>,
    pub building: Option<String>,
    pub requester_role: Option<Role>,
    pub requested_by: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl RequestFilter {
    pub fn matches(&self, req: &RequestRecord) -> bool {
        if let Some(sf) = &self.status
            && !sf.matches(req.status)
        {
            return false;
        }
        if let Some(b) = &self.building
            && req.building != *b
        {
            return false;
        }
        if let Some(role) = self.requester_role
            && req.requester_role != role
        {
            return false;
        }
        if let Some(by) = &self.requested_by
            && req.requested_by != *by
        {
            return false;
        }
        if let Some(from) = self.from
            && req.base_date < from
        {
            return false;
        }
        if let Some(to) = self.to
            && req.base_date > to
        {
            return false;
        }
        true
    }
}

/// Derived view of one cell. For `pending` cells the course, booked_by, and
/// request_id describe the earliest covering pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellView {
    pub status: CellStatus,
    pub course: Option<String>,
    pub booked_by: Option<String>,
    pub request_id: Option<Ulid>,
}

impl CellView {
    pub fn empty() -> Self {
        Self {
            status: CellStatus::Empty,
            course: None,
            booked_by: None,
            request_id: None,
        }
    }
}

/// One row of a schedule grid query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRow {
    pub date: NaiveDate,
    pub slot: SlotId,
    pub status: CellStatus,
    pub course: Option<String>,
    pub booked_by: Option<String>,
    pub request_id: Option<Ulid>,
}
