//! One outcome timestamp per entity.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::models::{EntityId, EntityTimestamps};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OutcomeError {
    #[error("Ambiguous outcome for entity {entity_id}: {n_timestamps} distinct timestamps, expected one")]
    AmbiguousOutcome {
        entity_id: String,
        n_timestamps: usize,
    },
}

/// Outcome timestamp lookup. Entities absent from the table have no outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeTimestamps {
    by_entity: HashMap<EntityId, NaiveDateTime>,
}

impl OutcomeTimestamps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strict construction: more than one distinct timestamp for an entity
    /// is an error. Repeats of the same timestamp collapse to one.
    pub fn from_entity_timestamps(timestamps: &EntityTimestamps) -> Result<Self, OutcomeError> {
        let mut by_entity = HashMap::with_capacity(timestamps.n_entities());

        for (entity_id, entity_timestamps) in timestamps.iter() {
            let Some(&first) = entity_timestamps.first() else {
                continue;
            };
            let n_distinct = 1 + entity_timestamps
                .windows(2)
                .filter(|w| w[0] != w[1])
                .count();
            if n_distinct > 1 {
                return Err(OutcomeError::AmbiguousOutcome {
                    entity_id: entity_id.to_string(),
                    n_timestamps: n_distinct,
                });
            }
            by_entity.insert(entity_id.clone(), first);
        }

        Ok(Self { by_entity })
    }

    pub fn from_rows<I, E>(rows: I) -> Result<Self, OutcomeError>
    where
        I: IntoIterator<Item = (E, NaiveDateTime)>,
        E: Into<EntityId>,
    {
        Self::from_entity_timestamps(&EntityTimestamps::from_rows(rows))
    }

    /// Lenient construction: keeps the earliest timestamp per entity.
    pub fn first_per_entity(timestamps: &EntityTimestamps) -> Self {
        let by_entity = timestamps
            .iter()
            .filter_map(|(entity_id, ts)| ts.first().map(|first| (entity_id.clone(), *first)))
            .collect();
        Self { by_entity }
    }

    pub fn insert(&mut self, entity_id: impl Into<EntityId>, timestamp: NaiveDateTime) -> Result<(), OutcomeError> {
        let entity_id = entity_id.into();
        match self.by_entity.get(&entity_id) {
            Some(existing) if *existing != timestamp => Err(OutcomeError::AmbiguousOutcome {
                entity_id: entity_id.to_string(),
                n_timestamps: 2,
            }),
            _ => {
                self.by_entity.insert(entity_id, timestamp);
                Ok(())
            }
        }
    }

    pub fn get(&self, entity_id: &EntityId) -> Option<NaiveDateTime> {
        self.by_entity.get(entity_id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_entity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }
}
