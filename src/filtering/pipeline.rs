use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use super::table::PredictionTimeTable;
use super::traits::{run_step, PredictionTimeFilter};
use super::FilterError;
use crate::models::EntityId;

/// Before/after counts for one step of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepDelta {
    pub step_index: usize,
    pub step_name: String,
    pub n_prediction_times_before: usize,
    pub n_prediction_times_after: usize,
    pub n_ids_before: usize,
    pub n_ids_after: usize,
}

impl StepDelta {
    pub fn n_dropped_prediction_times(&self) -> usize {
        self.n_prediction_times_before - self.n_prediction_times_after
    }

    pub fn n_dropped_ids(&self) -> usize {
        self.n_ids_before - self.n_ids_after
    }
}

/// Filtered table plus the ordered audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredPredictionTimes {
    pub run_id: String,
    pub prediction_times: PredictionTimeTable,
    pub filter_steps: Vec<StepDelta>,
}

impl FilteredPredictionTimes {
    /// One log line per step.
    pub fn log_summary(&self) {
        for step in &self.filter_steps {
            tracing::info!(
                run_id = %self.run_id,
                step_index = step.step_index,
                step = %step.step_name,
                prediction_times_before = step.n_prediction_times_before,
                prediction_times_after = step.n_prediction_times_after,
                dropped_prediction_times = step.n_dropped_prediction_times(),
                ids_before = step.n_ids_before,
                ids_after = step.n_ids_after,
                dropped_ids = step.n_dropped_ids(),
                "Filter step"
            );
        }
        tracing::info!(
            run_id = %self.run_id,
            remaining = self.prediction_times.len(),
            "Filtering finished"
        );
    }
}

/// Multiset of (entity id, timestamp) keys.
fn row_keys(table: &PredictionTimeTable) -> HashMap<(EntityId, NaiveDateTime), usize> {
    let mut keys = HashMap::with_capacity(table.len());
    for row in table.rows() {
        *keys.entry((row.entity_id.clone(), row.timestamp)).or_insert(0) += 1;
    }
    keys
}

/// Every output key must have been in the input, at most as often.
fn check_subset(
    step: &str,
    mut remaining: HashMap<(EntityId, NaiveDateTime), usize>,
    table: &PredictionTimeTable,
) -> Result<(), FilterError> {
    for row in table.rows() {
        match remaining.get_mut(&(row.entity_id.clone(), row.timestamp)) {
            Some(n) if *n > 0 => *n -= 1,
            _ => {
                return Err(FilterError::StepAlteredRows {
                    step: step.to_string(),
                    entity_id: row.entity_id.to_string(),
                    timestamp: row.timestamp,
                })
            }
        }
    }
    Ok(())
}

/// Ordered chain of filter steps, built once per cohort definition.
pub struct FilterPipeline {
    steps: Vec<Box<dyn PredictionTimeFilter>>,
}

#[derive(Default)]
pub struct FilterPipelineBuilder {
    steps: Vec<Box<dyn PredictionTimeFilter>>,
}

impl FilterPipelineBuilder {
    pub fn step(mut self, step: impl PredictionTimeFilter + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Adds the step when present, e.g. an optional quarantine.
    pub fn optional_step(self, step: Option<impl PredictionTimeFilter + 'static>) -> Self {
        match step {
            Some(step) => self.step(step),
            None => self,
        }
    }

    pub fn boxed_step(mut self, step: Box<dyn PredictionTimeFilter>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> FilterPipeline {
        FilterPipeline { steps: self.steps }
    }
}

impl FilterPipeline {
    pub fn builder() -> FilterPipelineBuilder {
        FilterPipelineBuilder::default()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order, recording counts before and after each.
    pub fn run(&self, table: PredictionTimeTable) -> Result<FilteredPredictionTimes, FilterError> {
        let run_id = Uuid::new_v4().to_string();
        let mut table = table;
        let mut filter_steps = Vec::with_capacity(self.steps.len());

        for (step_index, step) in self.steps.iter().enumerate() {
            let n_prediction_times_before = table.len();
            let n_ids_before = table.n_unique_ids();
            let keys_before = row_keys(&table);

            table = run_step(step.as_ref(), table)?;

            let n_prediction_times_after = table.len();
            let n_ids_after = table.n_unique_ids();

            if n_prediction_times_after > n_prediction_times_before || n_ids_after > n_ids_before {
                return Err(FilterError::StepAddedRows {
                    step: step.name().to_string(),
                    before: n_prediction_times_before,
                    after: n_prediction_times_after,
                });
            }

            check_subset(step.name(), keys_before, &table)?;

            tracing::debug!(
                run_id = %run_id,
                step = step.name(),
                dropped = n_prediction_times_before - n_prediction_times_after,
                "Applied filter step"
            );

            filter_steps.push(StepDelta {
                step_index,
                step_name: step.name().to_string(),
                n_prediction_times_before,
                n_prediction_times_after,
                n_ids_before,
                n_ids_after,
            });
        }

        Ok(FilteredPredictionTimes {
            run_id,
            prediction_times: table,
            filter_steps,
        })
    }
}
