//! The slot catalog: the fixed set of bookable slots in a school week.
//!
//! Reference data, not schedule state. Loaded once at startup (compiled-in
//! default or a JSON file) and shared read-only across every tenant.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::limits;
use crate::model::{SlotCategory, SlotId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: SlotId,
    pub label: String,
    pub category: SlotCategory,
    /// Display and expansion order. Ties broken by id.
    pub sort_order: u16,
}

#[derive(Debug, Clone)]
pub struct SlotCatalog {
    /// Sorted by (sort_order, id). Catalog order IS expansion order.
    slots: Vec<TimeSlot>,
    index: HashMap<SlotId, usize>,
}

impl SlotCatalog {
    pub fn new(mut slots: Vec<TimeSlot>) -> Result<Self, CatalogError> {
        if slots.is_empty() {
            return Err(CatalogError::Empty);
        }
        if slots.len() > limits::MAX_SLOTS {
            return Err(CatalogError::TooLarge(slots.len()));
        }
        slots.sort_by_key(|s| (s.sort_order, s.id));
        let mut index = HashMap::with_capacity(slots.len());
        for (pos, slot) in slots.iter().enumerate() {
            if index.insert(slot.id, pos).is_some() {
                return Err(CatalogError::DuplicateId(slot.id));
            }
        }
        Ok(Self { slots, index })
    }

    /// The standard school week: eight teaching periods plus two
    /// administrative blocks.
    pub fn school_week() -> Self {
        let mut slots: Vec<TimeSlot> = (1..=8)
            .map(|n| TimeSlot {
                id: n,
                label: format!("Period {n}"),
                category: SlotCategory::Classroom,
                sort_order: n,
            })
            .collect();
        slots.push(TimeSlot {
            id: 9,
            label: "Morning block".into(),
            category: SlotCategory::Administrative,
            sort_order: 9,
        });
        slots.push(TimeSlot {
            id: 10,
            label: "Afternoon block".into(),
            category: SlotCategory::Administrative,
            sort_order: 10,
        });
        Self::new(slots).expect("built-in catalog is valid")
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let slots: Vec<TimeSlot> =
            serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::new(slots)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let json =
            std::fs::read_to_string(path).map_err(|e| CatalogError::Io(e.to_string()))?;
        Self::from_json(&json)
    }

    pub fn all(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// List slots, optionally filtered by category. A filter that matches
    /// nothing falls back to the full catalog so callers always have
    /// something to render.
    pub fn list(&self, category: Option<SlotCategory>) -> Vec<TimeSlot> {
        match category {
            None => self.slots.clone(),
            Some(cat) => {
                let filtered: Vec<TimeSlot> = self
                    .slots
                    .iter()
                    .filter(|s| s.category == cat)
                    .cloned()
                    .collect();
                if filtered.is_empty() {
                    self.slots.clone()
                } else {
                    filtered
                }
            }
        }
    }

    pub fn get(&self, id: SlotId) -> Option<&TimeSlot> {
        self.index.get(&id).map(|&pos| &self.slots[pos])
    }

    pub fn contains(&self, id: SlotId) -> bool {
        self.index.contains_key(&id)
    }

    /// Position of a slot in catalog order.
    pub fn position(&self, id: SlotId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Slot ids from `start` through `end` inclusive, in catalog order.
    /// `None` when either id is unknown; empty when `start` sorts after `end`.
    pub fn slot_ids_between(&self, start: SlotId, end: SlotId) -> Option<Vec<SlotId>> {
        let sp = self.position(start)?;
        let ep = self.position(end)?;
        if sp > ep {
            return Some(Vec::new());
        }
        Some(self.slots[sp..=ep].iter().map(|s| s.id).collect())
    }

    /// Whether `slot` falls inside the inclusive catalog-order range
    /// `[start, end]`. Unknown ids are never inside.
    pub fn range_contains(&self, start: SlotId, end: SlotId, slot: SlotId) -> bool {
        let (Some(sp), Some(ep), Some(p)) = (
            self.position(start),
            self.position(end),
            self.position(slot),
        ) else {
            return false;
        };
        sp <= p && p <= ep
    }
}

#[derive(Debug)]
pub enum CatalogError {
    Empty,
    TooLarge(usize),
    DuplicateId(SlotId),
    Parse(String),
    Io(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Empty => write!(f, "slot catalog is empty"),
            CatalogError::TooLarge(n) => {
                write!(f, "slot catalog has {} slots (max {})", n, limits::MAX_SLOTS)
            }
            CatalogError::DuplicateId(id) => write!(f, "duplicate slot id {id}"),
            CatalogError::Parse(e) => write!(f, "slot catalog parse error: {e}"),
            CatalogError::Io(e) => write!(f, "slot catalog read error: {e}"),
        }
    }
}

impl std::error::Error for CatalogError {}
