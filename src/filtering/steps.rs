//! Reusable eligibility steps: date bounds, age, prevalence, wash-in and
//! minimum lookahead.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use super::table::{ColumnValue, PredictionTimeRow, PredictionTimeTable};
use super::traits::PredictionTimeFilter;
use super::FilterError;
use crate::models::{EntityId, EntityTimestamps};

pub const AGE_COLUMN: &str = "age";

const DAYS_PER_YEAR: f64 = 365.25;

fn log_dropped(step: &str, before: usize, table: &PredictionTimeTable) {
    tracing::info!(
        step,
        dropped = before - table.len(),
        remaining = table.len(),
        "Filtered prediction times"
    );
}

/// Keeps prediction times at or after `min_timestamp`.
#[derive(Debug, Clone)]
pub struct MinDateFilter {
    min_timestamp: NaiveDateTime,
}

impl MinDateFilter {
    pub fn new(min_timestamp: NaiveDateTime) -> Self {
        Self { min_timestamp }
    }
}

impl PredictionTimeFilter for MinDateFilter {
    fn name(&self) -> &str {
        "MinDateFilter"
    }

    fn apply(&self, mut table: PredictionTimeTable) -> Result<PredictionTimeTable, FilterError> {
        let before = table.len();
        table.retain(|row| row.timestamp >= self.min_timestamp);
        log_dropped(self.name(), before, &table);
        Ok(table)
    }
}

/// Keeps prediction times at or before `max_timestamp`.
#[derive(Debug, Clone)]
pub struct MaxDateFilter {
    max_timestamp: NaiveDateTime,
}

impl MaxDateFilter {
    pub fn new(max_timestamp: NaiveDateTime) -> Self {
        Self { max_timestamp }
    }
}

impl PredictionTimeFilter for MaxDateFilter {
    fn name(&self) -> &str {
        "MaxDateFilter"
    }

    fn apply(&self, mut table: PredictionTimeTable) -> Result<PredictionTimeTable, FilterError> {
        let before = table.len();
        table.retain(|row| row.timestamp <= self.max_timestamp);
        log_dropped(self.name(), before, &table);
        Ok(table)
    }
}

/// Adds an `age` column (years, fractional) from injected birthdates.
/// Entities without a birthdate get a null age.
#[derive(Debug, Clone)]
pub struct AddAge {
    birthdates: HashMap<EntityId, NaiveDate>,
}

impl AddAge {
    pub fn new(birthdates: HashMap<EntityId, NaiveDate>) -> Self {
        Self { birthdates }
    }

    fn age_at(&self, row: &PredictionTimeRow) -> ColumnValue {
        match self.birthdates.get(&row.entity_id) {
            Some(birthdate) => {
                let days = (row.timestamp.date() - *birthdate).num_days();
                ColumnValue::Float(days as f64 / DAYS_PER_YEAR)
            }
            None => ColumnValue::Null,
        }
    }
}

impl PredictionTimeFilter for AddAge {
    fn name(&self) -> &str {
        "AddAge"
    }

    fn apply(&self, mut table: PredictionTimeTable) -> Result<PredictionTimeTable, FilterError> {
        table.add_column(AGE_COLUMN, |row| self.age_at(row));
        Ok(table)
    }
}

fn age_of(row: &PredictionTimeRow) -> Option<f64> {
    row.get(AGE_COLUMN).and_then(ColumnValue::as_f64)
}

/// Keeps prediction times where `age >= min_age_years`. Null ages are dropped.
#[derive(Debug, Clone)]
pub struct MinAgeFilter {
    min_age_years: f64,
}

impl MinAgeFilter {
    pub fn new(min_age_years: f64) -> Self {
        Self { min_age_years }
    }
}

impl PredictionTimeFilter for MinAgeFilter {
    fn name(&self) -> &str {
        "MinAgeFilter"
    }

    fn required_columns(&self) -> &[&'static str] {
        &[AGE_COLUMN]
    }

    fn apply(&self, mut table: PredictionTimeTable) -> Result<PredictionTimeTable, FilterError> {
        let before = table.len();
        table.retain(|row| age_of(row).is_some_and(|age| age >= self.min_age_years));
        log_dropped(self.name(), before, &table);
        Ok(table)
    }
}

/// Keeps prediction times where `age <= max_age_years`. Null ages are dropped.
#[derive(Debug, Clone)]
pub struct MaxAgeFilter {
    max_age_years: f64,
}

impl MaxAgeFilter {
    pub fn new(max_age_years: f64) -> Self {
        Self { max_age_years }
    }
}

impl PredictionTimeFilter for MaxAgeFilter {
    fn name(&self) -> &str {
        "MaxAgeFilter"
    }

    fn required_columns(&self) -> &[&'static str] {
        &[AGE_COLUMN]
    }

    fn apply(&self, mut table: PredictionTimeTable) -> Result<PredictionTimeTable, FilterError> {
        let before = table.len();
        table.retain(|row| age_of(row).is_some_and(|age| age <= self.max_age_years));
        log_dropped(self.name(), before, &table);
        Ok(table)
    }
}

/// Drops prediction times that come strictly after any prevalent event
/// (e.g. a prior diagnosis) for the same entity.
#[derive(Debug, Clone)]
pub struct PrevalentEventFilter {
    name: String,
    events: EntityTimestamps,
}

impl PrevalentEventFilter {
    pub fn new(name: impl Into<String>, events: EntityTimestamps) -> Self {
        Self {
            name: name.into(),
            events,
        }
    }
}

impl PredictionTimeFilter for PrevalentEventFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, mut table: PredictionTimeTable) -> Result<PredictionTimeTable, FilterError> {
        let before = table.len();
        table.retain(|row| {
            // Timestamps are ascending, so the first one decides.
            match self.events.get(&row.entity_id).first() {
                Some(first) => *first >= row.timestamp,
                None => true,
            }
        });
        log_dropped(self.name(), before, &table);
        Ok(table)
    }
}

/// Drops every prediction time of an entity with an event before `cutoff`.
///
/// Used when events before the start of data coverage cannot be told apart
/// from prevalent cases.
#[derive(Debug, Clone)]
pub struct WashinFilter {
    events: EntityTimestamps,
    cutoff: NaiveDateTime,
}

impl WashinFilter {
    pub fn new(events: EntityTimestamps, cutoff: NaiveDateTime) -> Self {
        Self { events, cutoff }
    }
}

impl PredictionTimeFilter for WashinFilter {
    fn name(&self) -> &str {
        "WashinFilter"
    }

    fn apply(&self, mut table: PredictionTimeTable) -> Result<PredictionTimeTable, FilterError> {
        let before = table.len();
        table.retain(|row| {
            self.events
                .get(&row.entity_id)
                .first()
                .map_or(true, |first| *first >= self.cutoff)
        });
        log_dropped(self.name(), before, &table);
        Ok(table)
    }
}

/// Drops prediction times too close to the end of the data to observe their
/// full lookahead: keeps `timestamp < horizon - min_lookahead`.
///
/// The horizon defaults to the latest prediction time in the table.
#[derive(Debug, Clone)]
pub struct MinLookaheadFilter {
    min_lookahead: Duration,
    horizon: Option<NaiveDateTime>,
}

impl MinLookaheadFilter {
    pub fn new(min_lookahead: Duration) -> Self {
        Self {
            min_lookahead,
            horizon: None,
        }
    }

    pub fn from_days(min_lookahead_days: i64) -> Self {
        Self::new(Duration::days(min_lookahead_days))
    }

    pub fn with_horizon(mut self, horizon: NaiveDateTime) -> Self {
        self.horizon = Some(horizon);
        self
    }
}

impl PredictionTimeFilter for MinLookaheadFilter {
    fn name(&self) -> &str {
        "MinLookaheadFilter"
    }

    fn apply(&self, mut table: PredictionTimeTable) -> Result<PredictionTimeTable, FilterError> {
        let Some(horizon) = self.horizon.or_else(|| table.max_timestamp()) else {
            return Ok(table);
        };
        let before = table.len();
        match horizon.checked_sub_signed(self.min_lookahead) {
            Some(cutoff) => table.retain(|row| row.timestamp < cutoff),
            None => table.retain(|_| false),
        }
        log_dropped(self.name(), before, &table);
        Ok(table)
    }
}
