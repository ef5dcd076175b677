use super::table::PredictionTimeTable;
use super::FilterError;

/// One named eligibility step.
///
/// `apply` may only remove rows or add derived columns; it never edits or
/// adds rows. Columns listed in `required_columns` are checked before the
/// step runs.
pub trait PredictionTimeFilter: Send + Sync {
    fn name(&self) -> &str;

    fn required_columns(&self) -> &[&'static str] {
        &[]
    }

    fn apply(&self, table: PredictionTimeTable) -> Result<PredictionTimeTable, FilterError>;
}

/// Checks required columns, then applies the step.
pub fn run_step(
    step: &dyn PredictionTimeFilter,
    table: PredictionTimeTable,
) -> Result<PredictionTimeTable, FilterError> {
    table.require_columns(step.name(), step.required_columns())?;
    step.apply(table)
}
