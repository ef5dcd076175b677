use chrono::NaiveDateTime;
use serde::Serialize;

use super::entity::EntityId;
use super::event::{StaticFeature, TemporalEvent};
use super::patient::Patient;

/// Format used for the timestamp half of a prediction time uuid.
pub const PREDICTION_TIME_UUID_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Deterministic join key between predictors, labels and evaluation metadata:
/// `"{entity_id}-%Y-%m-%d-%H-%M-%S"`.
pub fn prediction_time_uuid(entity_id: &EntityId, timestamp: &NaiveDateTime) -> String {
    format!(
        "{}-{}",
        entity_id,
        timestamp.format(PREDICTION_TIME_UUID_FORMAT)
    )
}

/// A cut sequence of events for a patient, ready to issue a prediction.
///
/// Borrows its patient and the patient's static features; owns its own
/// slice of temporal events.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionTime<'a> {
    patient: &'a Patient,
    temporal_events: Vec<TemporalEvent>,
    static_features: &'a [StaticFeature],
    prediction_timestamp: NaiveDateTime,
    outcome: bool,
}

impl<'a> PredictionTime<'a> {
    pub(crate) fn new(
        patient: &'a Patient,
        temporal_events: Vec<TemporalEvent>,
        prediction_timestamp: NaiveDateTime,
        outcome: bool,
    ) -> Self {
        Self {
            patient,
            temporal_events,
            static_features: patient.static_events(),
            prediction_timestamp,
            outcome,
        }
    }

    pub fn patient(&self) -> &'a Patient {
        self.patient
    }

    pub fn temporal_events(&self) -> &[TemporalEvent] {
        &self.temporal_events
    }

    pub fn static_features(&self) -> &'a [StaticFeature] {
        self.static_features
    }

    pub fn prediction_timestamp(&self) -> NaiveDateTime {
        self.prediction_timestamp
    }

    /// Whether the outcome occurs within the lookahead.
    pub fn outcome(&self) -> bool {
        self.outcome
    }

    pub fn uuid(&self) -> String {
        prediction_time_uuid(self.patient.patient_id(), &self.prediction_timestamp)
    }

    /// Owned, serializable copy keyed by the prediction time uuid.
    pub fn to_record(&self) -> PredictionTimeRecord {
        PredictionTimeRecord {
            prediction_time_uuid: self.uuid(),
            entity_id: self.patient.patient_id().clone(),
            timestamp: self.prediction_timestamp,
            outcome: self.outcome,
            temporal_events: self.temporal_events.clone(),
            static_features: self.static_features.to_vec(),
        }
    }
}

/// Flattened prediction time, detached from the patient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionTimeRecord {
    pub prediction_time_uuid: String,
    pub entity_id: EntityId,
    pub timestamp: NaiveDateTime,
    pub outcome: bool,
    pub temporal_events: Vec<TemporalEvent>,
    pub static_features: Vec<StaticFeature>,
}
