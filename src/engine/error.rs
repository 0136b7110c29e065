use ulid::Ulid;

use crate::model::{CellKey, RequestStatus, SlotId};

#[derive(Debug)]
pub enum EngineError {
    /// Malformed input: bad slot range, week count, role, or date.
    Validation(&'static str),
    NotFound(Ulid),
    UnknownSlot(SlotId),
    AlreadyExists(Ulid),
    /// Cells already blocked by a stored entry, in expansion order.
    Conflict { cells: Vec<CellKey> },
    /// Lifecycle transition not allowed from the request's current status.
    InvalidState {
        request: Ulid,
        status: RequestStatus,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::UnknownSlot(id) => write!(f, "unknown slot: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflict { cells } => {
                write!(f, "conflict:")?;
                for c in cells {
                    write!(f, " ({}, {})", c.date, c.slot)?;
                }
                Ok(())
            }
            EngineError::InvalidState { request, status } => {
                write!(
                    f,
                    "invalid transition for request {request}: status is {}",
                    status.as_str()
                )
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
