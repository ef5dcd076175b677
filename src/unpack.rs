//! Unpacks flat source tables into one [`Patient`] per entity id.
//!
//! Rows from a table with a timestamp column become temporal events; rows
//! from a table without one become static features. All sources are merged,
//! so an entity seen in several tables yields a single patient.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::models::{EntityId, EventDraft, EventValue, Patient};

#[derive(Error, Debug, PartialEq)]
pub enum UnpackError {
    #[error("Malformed row {row_index} in source '{source_table}' (entity {entity_id}): {reason}")]
    MalformedEventRow {
        source_table: String,
        row_index: usize,
        entity_id: String,
        reason: &'static str,
    },
}

/// One row as produced by a loader.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub entity_id: Option<EntityId>,
    pub timestamp: Option<NaiveDateTime>,
    pub source: String,
    pub source_subtype: Option<String>,
    pub value: Option<EventValue>,
    pub name: Option<String>,
}

impl SourceRow {
    pub fn new(
        entity_id: impl Into<EntityId>,
        source: impl Into<String>,
        value: impl Into<EventValue>,
    ) -> Self {
        Self {
            entity_id: Some(entity_id.into()),
            timestamp: None,
            source: source.into(),
            source_subtype: None,
            value: Some(value.into()),
            name: None,
        }
    }

    pub fn at(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A uniformly shaped loader result.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    pub name: String,
    pub has_timestamp_column: bool,
    pub rows: Vec<SourceRow>,
}

impl SourceTable {
    /// A table whose rows are timestamped events.
    pub fn temporal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            has_timestamp_column: true,
            rows: Vec::new(),
        }
    }

    /// A table whose rows are static, patient-level features.
    pub fn static_features(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            has_timestamp_column: false,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(mut self, rows: impl IntoIterator<Item = SourceRow>) -> Self {
        self.rows.extend(rows);
        self
    }

    pub fn push(&mut self, row: SourceRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Classifies one row, failing on anything that is neither temporal nor static.
fn to_draft(table: &SourceTable, row_index: usize, row: &SourceRow) -> Result<(EntityId, EventDraft), UnpackError> {
    let malformed = |entity_id: String, reason: &'static str| UnpackError::MalformedEventRow {
        source_table: table.name.clone(),
        row_index,
        entity_id,
        reason,
    };

    let Some(entity_id) = row.entity_id.clone() else {
        return Err(malformed("<null>".into(), "entity id is null"));
    };

    let draft = match (table.has_timestamp_column, row.timestamp, row.value.clone()) {
        (false, Some(_), _) => {
            return Err(malformed(
                entity_id.to_string(),
                "timestamp present in a static source",
            ))
        }
        (true, Some(timestamp), value) => EventDraft::Temporal {
            timestamp,
            source: row.source.clone(),
            source_subtype: row.source_subtype.clone(),
            value,
            name: row.name.clone(),
        },
        (true, None, _) => {
            return Err(malformed(
                entity_id.to_string(),
                "timestamp is null in a timestamped source",
            ))
        }
        (false, None, Some(value)) => EventDraft::Static {
            source: row.source.clone(),
            value,
        },
        (false, None, None) => {
            return Err(malformed(
                entity_id.to_string(),
                "both timestamp and value are missing",
            ))
        }
    };

    Ok((entity_id, draft))
}

/// Merges every source into one patient per entity id, ordered by entity id.
///
/// Every row is validated before any patient is built.
pub fn unpack_patients(sources: &[SourceTable]) -> Result<Vec<Patient>, UnpackError> {
    let mut drafts: BTreeMap<EntityId, Vec<EventDraft>> = BTreeMap::new();

    for table in sources {
        for (row_index, row) in table.rows.iter().enumerate() {
            let (entity_id, draft) = to_draft(table, row_index, row)?;
            drafts.entry(entity_id).or_default().push(draft);
        }
        tracing::debug!(source = %table.name, rows = table.len(), "Unpacked source table");
    }

    let patients: Vec<Patient> = drafts
        .into_iter()
        .map(|(entity_id, events)| {
            let mut patient = Patient::new(entity_id);
            patient.add_events(events);
            patient
        })
        .collect();

    tracing::info!(
        n_sources = sources.len(),
        n_patients = patients.len(),
        "Unpacked source tables into patients"
    );

    Ok(patients)
}
