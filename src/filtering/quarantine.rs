//! Quarantine (washout) after a disqualifying event.
//!
//! A prediction time is dropped when, for any quarantine event of the same
//! entity, `0 < days_since_quarantine < quarantine_days`. Both bounds are
//! exclusive: a prediction time on the quarantine day itself is kept.

use chrono::NaiveDateTime;

use super::table::{PredictionTimeRow, PredictionTimeTable};
use super::traits::PredictionTimeFilter;
use super::FilterError;
use crate::models::EntityTimestamps;

#[derive(Debug, Clone)]
pub struct QuarantineFilter {
    quarantine_events: EntityTimestamps,
    quarantine_days: i64,
}

impl QuarantineFilter {
    pub fn new(quarantine_events: EntityTimestamps, quarantine_days: i64) -> Result<Self, FilterError> {
        if quarantine_days < 0 {
            return Err(FilterError::QuarantineConfiguration(format!(
                "quarantine_days must be non-negative, got {quarantine_days}"
            )));
        }
        Ok(Self {
            quarantine_events,
            quarantine_days,
        })
    }

    /// Builds the step from optional parts. Both present yields a filter,
    /// both absent yields `None`, anything else is a configuration error.
    pub fn from_parts(
        quarantine_events: Option<EntityTimestamps>,
        quarantine_days: Option<i64>,
    ) -> Result<Option<Self>, FilterError> {
        match (quarantine_events, quarantine_days) {
            (Some(events), Some(days)) => Self::new(events, days).map(Some),
            (None, None) => Ok(None),
            (Some(_), None) => Err(FilterError::QuarantineConfiguration(
                "quarantine events provided without quarantine_days".into(),
            )),
            (None, Some(_)) => Err(FilterError::QuarantineConfiguration(
                "quarantine_days provided without quarantine events".into(),
            )),
        }
    }

    fn hit_by(&self, quarantine_timestamp: NaiveDateTime, prediction_timestamp: NaiveDateTime) -> bool {
        let days_since_quarantine = (prediction_timestamp - quarantine_timestamp).num_days();
        0 < days_since_quarantine && days_since_quarantine < self.quarantine_days
    }

    pub fn is_quarantined(&self, row: &PredictionTimeRow) -> bool {
        self.quarantine_events
            .get(&row.entity_id)
            .iter()
            .any(|q| self.hit_by(*q, row.timestamp))
    }
}

impl PredictionTimeFilter for QuarantineFilter {
    fn name(&self) -> &str {
        "QuarantineFilter"
    }

    fn apply(&self, mut table: PredictionTimeTable) -> Result<PredictionTimeTable, FilterError> {
        let before = table.len();
        table.retain(|row| !self.is_quarantined(row));
        tracing::info!(
            quarantine_days = self.quarantine_days,
            dropped = before - table.len(),
            "Filtered prediction times by quarantine period"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 1)
            .unwrap()
    }

    #[test]
    fn drops_within_quarantine_after_event() {
        let quarantine = EntityTimestamps::from_rows(vec![
            (1, date(2021, 1, 1)),
            (1, date(2022, 1, 1)),
        ]);
        let table = PredictionTimeTable::from_rows(vec![
            (1, date(2020, 12, 1)), // keep: before quarantine date
            (1, date(2022, 12, 1)), // drop: after quarantine date
            (1, date(2026, 2, 1)),  // keep: outside quarantine days
            (2, date(2023, 2, 1)),  // keep: no quarantine date for this id
        ]);
        let expected = PredictionTimeTable::from_rows(vec![
            (1, date(2020, 12, 1)),
            (1, date(2026, 2, 1)),
            (2, date(2023, 2, 1)),
        ]);

        let filtered = QuarantineFilter::new(quarantine, 730)
            .unwrap()
            .apply(table)
            .unwrap();

        assert_eq!(filtered, expected);
    }

    #[test]
    fn boundaries_are_exclusive() {
        let day_zero = date(2020, 1, 1);
        let quarantine = EntityTimestamps::from_rows(vec![(1, day_zero)]);
        let filter = QuarantineFilter::new(quarantine, 730).unwrap();

        let table = PredictionTimeTable::from_rows(
            [-5, 0, 1, 729, 730]
                .into_iter()
                .map(|d| (1, day_zero + Duration::days(d))),
        );
        let kept: Vec<_> = filter
            .apply(table)
            .unwrap()
            .rows()
            .iter()
            .map(|row| (row.timestamp - day_zero).num_days())
            .collect();

        assert_eq!(kept, vec![-5, 0, 730]);
    }

    #[test]
    fn any_quarantine_event_hits() {
        let quarantine = EntityTimestamps::from_rows(vec![
            (1, date(2010, 1, 1)),
            (1, date(2020, 1, 1)),
        ]);
        let filter = QuarantineFilter::new(quarantine, 30).unwrap();
        let row = PredictionTimeRow::new(1, date(2020, 1, 15));
        assert!(filter.is_quarantined(&row));
    }

    #[test]
    fn from_parts_requires_both_or_neither() {
        assert!(QuarantineFilter::from_parts(None, None).unwrap().is_none());
        assert!(QuarantineFilter::from_parts(Some(EntityTimestamps::new()), Some(10))
            .unwrap()
            .is_some());

        let err = QuarantineFilter::from_parts(Some(EntityTimestamps::new()), None).unwrap_err();
        assert!(matches!(err, FilterError::QuarantineConfiguration(_)));

        let err = QuarantineFilter::from_parts(None, Some(730)).unwrap_err();
        assert!(matches!(err, FilterError::QuarantineConfiguration(_)));
    }

    #[test]
    fn negative_days_rejected() {
        let err = QuarantineFilter::new(EntityTimestamps::new(), -1).unwrap_err();
        assert!(matches!(err, FilterError::QuarantineConfiguration(_)));
    }
}
