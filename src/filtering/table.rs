use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDateTime;
use serde::Serialize;

use super::FilterError;
use crate::models::{prediction_time_uuid, EntityId};

pub const ENTITY_ID_COLUMN: &str = "entity_id";
pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const PREDICTION_TIME_UUID_COLUMN: &str = "prediction_time_uuid";

/// Value of a derived column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// One candidate prediction time plus any derived columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionTimeRow {
    pub entity_id: EntityId,
    pub timestamp: NaiveDateTime,
    #[serde(flatten)]
    columns: BTreeMap<String, ColumnValue>,
}

impl PredictionTimeRow {
    pub fn new(entity_id: impl Into<EntityId>, timestamp: NaiveDateTime) -> Self {
        Self {
            entity_id: entity_id.into(),
            timestamp,
            columns: BTreeMap::new(),
        }
    }

    /// Derived column value; `None` when the column was never added.
    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.columns.get(column)
    }

    pub fn uuid(&self) -> String {
        prediction_time_uuid(&self.entity_id, &self.timestamp)
    }
}

/// Table of candidate prediction times.
///
/// `entity_id` and `timestamp` are always present; other columns are
/// registered by [`PredictionTimeTable::add_column`] and hold a value on
/// every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PredictionTimeTable {
    columns: Vec<String>,
    rows: Vec<PredictionTimeRow>,
}

impl PredictionTimeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows<I, E>(rows: I) -> Self
    where
        I: IntoIterator<Item = (E, NaiveDateTime)>,
        E: Into<EntityId>,
    {
        let mut table = Self::new();
        for (entity_id, timestamp) in rows {
            table.push(entity_id, timestamp);
        }
        table
    }

    /// Appends a row; derived columns start out null.
    pub fn push(&mut self, entity_id: impl Into<EntityId>, timestamp: NaiveDateTime) {
        let mut row = PredictionTimeRow::new(entity_id, timestamp);
        for column in &self.columns {
            row.columns.insert(column.clone(), ColumnValue::Null);
        }
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[PredictionTimeRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_unique_ids(&self) -> usize {
        self.rows
            .iter()
            .map(|row| &row.entity_id)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Entity ids in order of first appearance.
    pub fn entity_ids(&self) -> Vec<&EntityId> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .map(|row| &row.entity_id)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    pub fn max_timestamp(&self) -> Option<NaiveDateTime> {
        self.rows.iter().map(|row| row.timestamp).max()
    }

    pub fn has_column(&self, column: &str) -> bool {
        column == ENTITY_ID_COLUMN
            || column == TIMESTAMP_COLUMN
            || self.columns.iter().any(|c| c == column)
    }

    /// All column names, fixed columns first.
    pub fn column_names(&self) -> Vec<&str> {
        [ENTITY_ID_COLUMN, TIMESTAMP_COLUMN]
            .into_iter()
            .chain(self.columns.iter().map(String::as_str))
            .collect()
    }

    /// Fails with every missing column listed at once.
    pub fn require_columns(&self, step: &str, columns: &[&str]) -> Result<(), FilterError> {
        let missing: Vec<String> = columns
            .iter()
            .filter(|c| !self.has_column(c))
            .map(|c| c.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(FilterError::MissingColumn {
                step: step.to_string(),
                columns: missing,
            })
        }
    }

    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&PredictionTimeRow) -> bool,
    {
        self.rows.retain(keep);
    }

    /// Adds (or overwrites) a derived column computed per row.
    pub fn add_column<F>(&mut self, column: &str, mut value: F)
    where
        F: FnMut(&PredictionTimeRow) -> ColumnValue,
    {
        for row in &mut self.rows {
            let v = value(row);
            row.columns.insert(column.to_string(), v);
        }
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }

    pub fn drop_column(&mut self, column: &str) {
        self.columns.retain(|c| c != column);
        for row in &mut self.rows {
            row.columns.remove(column);
        }
    }

    /// Materializes the `prediction_time_uuid` column.
    pub fn add_prediction_time_uuid_column(&mut self) {
        self.add_column(PREDICTION_TIME_UUID_COLUMN, |row| ColumnValue::Text(row.uuid()));
    }
}
