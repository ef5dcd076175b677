use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Stable patient/person identifier, the join key across every source table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Str(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<i32> for EntityId {
    fn from(id: i32) -> Self {
        Self::Int(i64::from(id))
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::Str(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self::Str(id)
    }
}

/// Timestamps grouped per entity: quarantine events, prior diagnoses,
/// outcome candidates. Each entity's timestamps are kept ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityTimestamps {
    by_entity: BTreeMap<EntityId, Vec<NaiveDateTime>>,
}

impl EntityTimestamps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows<I, E>(rows: I) -> Self
    where
        I: IntoIterator<Item = (E, NaiveDateTime)>,
        E: Into<EntityId>,
    {
        let mut by_entity: BTreeMap<EntityId, Vec<NaiveDateTime>> = BTreeMap::new();
        for (entity_id, timestamp) in rows {
            by_entity.entry(entity_id.into()).or_default().push(timestamp);
        }
        for timestamps in by_entity.values_mut() {
            timestamps.sort_unstable();
        }
        Self { by_entity }
    }

    /// Sorted insert of a single timestamp. Use [`Self::from_rows`] for bulk loads.
    pub fn push(&mut self, entity_id: impl Into<EntityId>, timestamp: NaiveDateTime) {
        let slot = self.by_entity.entry(entity_id.into()).or_default();
        let at = slot.partition_point(|ts| *ts <= timestamp);
        slot.insert(at, timestamp);
    }

    /// Ascending timestamps for one entity; empty when the entity has none.
    pub fn get(&self, entity_id: &EntityId) -> &[NaiveDateTime] {
        self.by_entity
            .get(entity_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &[NaiveDateTime])> {
        self.by_entity.iter().map(|(id, ts)| (id, ts.as_slice()))
    }

    /// Number of entities with at least one timestamp.
    pub fn n_entities(&self) -> usize {
        self.by_entity.len()
    }

    /// Total number of (entity, timestamp) rows.
    pub fn len(&self) -> usize {
        self.by_entity.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }
}
