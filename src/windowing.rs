//! Cuts a patient's event history into prediction times.
//!
//! For every candidate timestamp `t` the lookbehind window is the half-open
//! interval `[t - lookbehind, t)`. Events at exactly `t` are never visible,
//! so a zero lookbehind always yields an empty window. The outcome flag is
//! set iff the outcome timestamp is `<= t + lookahead`.
//!
//! Candidates are processed independently and in input order. Duplicate or
//! unsorted candidates produce duplicate or unsorted output; deduplication is
//! the caller's job.

use chrono::{Duration, NaiveDateTime};

use crate::models::{Patient, PredictionTime};

/// Start of the lookbehind window, saturating at the earliest representable instant.
pub fn window_start(prediction_timestamp: NaiveDateTime, lookbehind: Duration) -> NaiveDateTime {
    prediction_timestamp
        .checked_sub_signed(lookbehind)
        .unwrap_or(if lookbehind > Duration::zero() {
            NaiveDateTime::MIN
        } else {
            NaiveDateTime::MAX
        })
}

/// Whether `outcome_timestamp` falls at or before `prediction_timestamp + lookahead`.
pub fn outcome_within_lookahead(
    outcome_timestamp: Option<NaiveDateTime>,
    prediction_timestamp: NaiveDateTime,
    lookahead: Duration,
) -> bool {
    let Some(outcome) = outcome_timestamp else {
        return false;
    };
    match prediction_timestamp.checked_add_signed(lookahead) {
        Some(horizon) => outcome <= horizon,
        // Overflowed past the representable range in the lookahead's direction.
        None => lookahead > Duration::zero(),
    }
}

impl Patient {
    /// Converts task-agnostic patient data into one [`PredictionTime`] per
    /// candidate timestamp, in input order.
    pub fn to_prediction_times(
        &self,
        lookbehind: Duration,
        lookahead: Duration,
        outcome_timestamp: Option<NaiveDateTime>,
        prediction_timestamps: &[NaiveDateTime],
    ) -> Vec<PredictionTime<'_>> {
        tracing::debug!(
            patient_id = %self.patient_id(),
            n_candidates = prediction_timestamps.len(),
            n_events = self.temporal_events().len(),
            "Windowing patient"
        );

        prediction_timestamps
            .iter()
            .map(|&t| {
                let start = window_start(t, lookbehind);
                let events = self.events_between(start, t).to_vec();
                let outcome = outcome_within_lookahead(outcome_timestamp, t, lookahead);
                PredictionTime::new(self, events, t, outcome)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDraft, EventValue};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn two_event_patient() -> Patient {
        let mut patient = Patient::new(1);
        patient.add_events(vec![
            EventDraft::temporal(date(2020, 1, 1), "lab", 5.0),
            EventDraft::temporal(date(2020, 1, 10), "lab", 7.0),
            EventDraft::static_feature("sex", "female"),
        ]);
        patient
    }

    #[test]
    fn seven_day_window_keeps_only_recent_event() {
        let patient = two_event_patient();
        let prediction_times = patient.to_prediction_times(
            Duration::days(7),
            Duration::days(30),
            Some(date(2020, 1, 20)),
            &[date(2020, 1, 11)],
        );

        assert_eq!(prediction_times.len(), 1);
        let pt = &prediction_times[0];
        assert_eq!(pt.temporal_events().len(), 1);
        assert_eq!(pt.temporal_events()[0].timestamp, date(2020, 1, 10));
        assert_eq!(pt.temporal_events()[0].value, Some(EventValue::from(7.0)));
        assert!(pt.outcome());
        assert_eq!(pt.static_features().len(), 1);
        assert_eq!(pt.patient().patient_id(), patient.patient_id());
    }

    #[test]
    fn event_at_prediction_time_is_excluded() {
        let patient = two_event_patient();
        let pts = patient.to_prediction_times(
            Duration::days(30),
            Duration::days(1),
            None,
            &[date(2020, 1, 10)],
        );
        let days: Vec<_> = pts[0].temporal_events().iter().map(|e| e.timestamp).collect();
        assert_eq!(days, vec![date(2020, 1, 1)]);
    }

    #[test]
    fn event_at_window_start_is_included() {
        let patient = two_event_patient();
        let pts = patient.to_prediction_times(
            Duration::days(9),
            Duration::days(1),
            None,
            &[date(2020, 1, 10)],
        );
        assert_eq!(pts[0].temporal_events().len(), 1);
        assert_eq!(pts[0].temporal_events()[0].timestamp, date(2020, 1, 1));
    }

    #[test]
    fn zero_lookbehind_is_always_empty() {
        let patient = two_event_patient();
        let pts = patient.to_prediction_times(
            Duration::zero(),
            Duration::days(1),
            None,
            &[date(2020, 1, 1), date(2020, 1, 10)],
        );
        assert!(pts.iter().all(|pt| pt.temporal_events().is_empty()));
    }

    #[test]
    fn empty_window_still_emits_prediction_time() {
        let patient = two_event_patient();
        let pts = patient.to_prediction_times(
            Duration::days(1),
            Duration::days(1),
            None,
            &[date(2019, 6, 1)],
        );
        assert_eq!(pts.len(), 1);
        assert!(pts[0].temporal_events().is_empty());
        assert!(!pts[0].outcome());
    }

    #[test]
    fn no_candidates_returns_empty() {
        let patient = two_event_patient();
        let pts = patient.to_prediction_times(Duration::days(1), Duration::days(1), None, &[]);
        assert!(pts.is_empty());
    }

    #[test]
    fn outcome_after_lookahead_is_false() {
        let patient = two_event_patient();
        let pts = patient.to_prediction_times(
            Duration::days(7),
            Duration::days(5),
            Some(date(2020, 1, 20)),
            &[date(2020, 1, 11), date(2020, 1, 15)],
        );
        assert!(!pts[0].outcome());
        // 2020-01-15 + 5 days == outcome: inclusive.
        assert!(pts[1].outcome());
    }

    #[test]
    fn outcome_before_prediction_time_is_true() {
        assert!(outcome_within_lookahead(
            Some(date(2019, 1, 1)),
            date(2020, 1, 1),
            Duration::days(1)
        ));
    }

    #[test]
    fn duplicate_and_unsorted_candidates_processed_independently() {
        let patient = two_event_patient();
        let candidates = [date(2020, 1, 11), date(2020, 1, 2), date(2020, 1, 11)];
        let pts = patient.to_prediction_times(
            Duration::days(7),
            Duration::days(30),
            None,
            &candidates,
        );

        let emitted: Vec<_> = pts.iter().map(|pt| pt.prediction_timestamp()).collect();
        assert_eq!(emitted, candidates.to_vec());
        assert_eq!(pts[0], pts[2]);
        assert_eq!(pts[1].temporal_events()[0].timestamp, date(2020, 1, 1));
    }

    #[test]
    fn window_start_saturates() {
        assert_eq!(
            window_start(date(2020, 1, 1), Duration::MAX),
            NaiveDateTime::MIN
        );
        assert!(outcome_within_lookahead(
            Some(date(2020, 1, 1)),
            date(2020, 1, 1),
            Duration::MAX
        ));
    }
}
