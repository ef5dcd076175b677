//! Convergence of eligibility filtering and windowing.
//!
//! A [`CohortDefinition`] supplies the filtered prediction times and the
//! outcome timestamps; a [`Cohort`] holds the patients and cuts one
//! [`PredictionTime`] per surviving row.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

use crate::config::{ConfigError, WindowConfig};
use crate::db::DatabaseError;
use crate::filtering::{
    FilterError, FilterPipelineBuilder, FilteredPredictionTimes, MinLookaheadFilter,
    PredictionTimeTable, QuarantineFilter, StepDelta,
};
use crate::models::{EntityId, EntityTimestamps, Patient, PredictionTime, PredictionTimeRecord};
use crate::outcome::{OutcomeError, OutcomeTimestamps};
use crate::unpack::{unpack_patients, SourceTable, UnpackError};

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error(transparent)]
    Unpack(#[from] UnpackError),

    #[error(transparent)]
    Outcome(#[from] OutcomeError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Prediction time refers to entity {entity_id} with no registered patient")]
    UnknownEntity { entity_id: String },

    #[error("Patient {entity_id} registered twice")]
    DuplicatePatient { entity_id: String },
}

/// Task-specific description of who gets a prediction and what counts as
/// the outcome.
pub trait CohortDefinition {
    fn filtered_prediction_times(&self) -> Result<FilteredPredictionTimes, DatasetError>;

    fn outcome_timestamps(&self) -> Result<OutcomeTimestamps, DatasetError>;
}

/// Appends the steps driven by [`WindowConfig`]: quarantine (when events or
/// days are given) followed by minimum lookahead.
pub fn append_config_steps(
    builder: FilterPipelineBuilder,
    config: &WindowConfig,
    quarantine_events: Option<EntityTimestamps>,
) -> Result<FilterPipelineBuilder, FilterError> {
    let quarantine = QuarantineFilter::from_parts(quarantine_events, config.quarantine_days)?;
    let min_lookahead = config.min_lookahead().map(MinLookaheadFilter::new);
    Ok(builder.optional_step(quarantine).optional_step(min_lookahead))
}

/// Patients keyed by entity id.
#[derive(Debug, Clone, Default)]
pub struct Cohort {
    patients: BTreeMap<EntityId, Patient>,
}

impl Cohort {
    pub fn new(patients: Vec<Patient>) -> Result<Self, DatasetError> {
        let mut by_id = BTreeMap::new();
        for patient in patients {
            let entity_id = patient.patient_id().clone();
            if by_id.insert(entity_id.clone(), patient).is_some() {
                return Err(DatasetError::DuplicatePatient {
                    entity_id: entity_id.to_string(),
                });
            }
        }
        Ok(Self { patients: by_id })
    }

    pub fn from_sources(sources: &[SourceTable]) -> Result<Self, DatasetError> {
        Self::new(unpack_patients(sources)?)
    }

    /// Registers an empty patient for every entity in `table` that has none,
    /// so entities without events still get prediction times.
    pub fn include_entities(&mut self, table: &PredictionTimeTable) -> usize {
        let mut added = 0;
        for entity_id in table.entity_ids() {
            if !self.patients.contains_key(entity_id) {
                self.patients.insert(entity_id.clone(), Patient::new(entity_id.clone()));
                added += 1;
            }
        }
        if added > 0 {
            tracing::debug!(added, "Registered patients without events");
        }
        added
    }

    pub fn patient(&self, entity_id: &EntityId) -> Option<&Patient> {
        self.patients.get(entity_id)
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    /// One prediction time per row of `table`, grouped by entity in order of
    /// first appearance and in row order within an entity.
    pub fn prediction_times(
        &self,
        table: &PredictionTimeTable,
        outcomes: &OutcomeTimestamps,
        config: &WindowConfig,
    ) -> Result<Vec<PredictionTime<'_>>, DatasetError> {
        let mut order: Vec<&EntityId> = Vec::new();
        let mut candidates: HashMap<&EntityId, Vec<NaiveDateTime>> = HashMap::new();
        for row in table.rows() {
            candidates
                .entry(&row.entity_id)
                .or_insert_with(|| {
                    order.push(&row.entity_id);
                    Vec::new()
                })
                .push(row.timestamp);
        }

        let lookbehind = config.lookbehind();
        let lookahead = config.lookahead();
        let mut prediction_times = Vec::with_capacity(table.len());

        for entity_id in order {
            let patient = self
                .patients
                .get(entity_id)
                .ok_or_else(|| DatasetError::UnknownEntity {
                    entity_id: entity_id.to_string(),
                })?;
            let timestamps = candidates.get(entity_id).map(Vec::as_slice).unwrap_or_default();

            let mut sorted = timestamps.to_vec();
            sorted.sort_unstable();
            sorted.dedup();
            if sorted.len() < timestamps.len() {
                tracing::warn!(
                    entity_id = %entity_id,
                    duplicates = timestamps.len() - sorted.len(),
                    "Duplicate prediction timestamps are windowed independently"
                );
            }

            prediction_times.extend(patient.to_prediction_times(
                lookbehind,
                lookahead,
                outcomes.get(entity_id),
                timestamps,
            ));
        }

        Ok(prediction_times)
    }
}

/// Output of [`build_dataset`], detached from the cohort's patients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub run_id: String,
    pub records: Vec<PredictionTimeRecord>,
    pub filter_steps: Vec<StepDelta>,
}

impl Dataset {
    pub fn n_positive(&self) -> usize {
        self.records.iter().filter(|r| r.outcome).count()
    }
}

/// Unpacks `sources`, applies the definition's filtering and windows every
/// surviving prediction time.
pub fn build_dataset(
    definition: &dyn CohortDefinition,
    sources: &[SourceTable],
    config: &WindowConfig,
) -> Result<Dataset, DatasetError> {
    config.validate()?;

    let filtered = definition.filtered_prediction_times()?;
    filtered.log_summary();
    let outcomes = definition.outcome_timestamps()?;

    let mut cohort = Cohort::from_sources(sources)?;
    cohort.include_entities(&filtered.prediction_times);

    let records: Vec<PredictionTimeRecord> = cohort
        .prediction_times(&filtered.prediction_times, &outcomes, config)?
        .iter()
        .map(PredictionTime::to_record)
        .collect();

    let dataset = Dataset {
        run_id: filtered.run_id,
        records,
        filter_steps: filtered.filter_steps,
    };
    tracing::info!(
        run_id = %dataset.run_id,
        patients = cohort.len(),
        prediction_times = dataset.records.len(),
        positive = dataset.n_positive(),
        "Built dataset"
    );
    Ok(dataset)
}
