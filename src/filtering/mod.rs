//! Eligibility filtering of candidate prediction times.
//!
//! ```text
//! PredictionTimeTable → step 1 → step 2 → … → FilteredPredictionTimes
//!                         │        │
//!                      StepDelta StepDelta
//! ```
//!
//! Steps only remove rows or add columns read by later steps. Auxiliary data
//! (birthdates, quarantine events) is injected when a step is constructed.

pub mod table;
pub mod traits;
pub mod pipeline;
pub mod steps;
pub mod quarantine;

pub use table::{ColumnValue, PredictionTimeRow, PredictionTimeTable};
pub use traits::PredictionTimeFilter;
pub use pipeline::{FilterPipeline, FilterPipelineBuilder, FilteredPredictionTimes, StepDelta};
pub use steps::*;
pub use quarantine::QuarantineFilter;

use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FilterError {
    #[error("Step '{step}' requires missing column(s): {}", columns.join(", "))]
    MissingColumn { step: String, columns: Vec<String> },

    #[error("Quarantine configuration error: {0}")]
    QuarantineConfiguration(String),

    #[error("Step '{step}' added rows ({before} before, {after} after)")]
    StepAddedRows {
        step: String,
        before: usize,
        after: usize,
    },

    #[error("Step '{step}' produced row ({entity_id}, {timestamp}) absent from its input")]
    StepAlteredRows {
        step: String,
        entity_id: String,
        timestamp: NaiveDateTime,
    },
}
