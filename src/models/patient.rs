use chrono::NaiveDateTime;
use serde::Serialize;

use super::entity::EntityId;
use super::event::{AttachedEvent, EventDraft, StaticFeature, TemporalEvent};

/// All task-agnostic data for one patient.
///
/// Temporal events are kept ascending by timestamp; the sort happens on
/// write so reads never mutate.
#[derive(Debug, Clone, Serialize)]
pub struct Patient {
    patient_id: EntityId,
    temporal_events: Vec<TemporalEvent>,
    static_features: Vec<StaticFeature>,
}

impl Patient {
    pub fn new(patient_id: impl Into<EntityId>) -> Self {
        Self {
            patient_id: patient_id.into(),
            temporal_events: Vec::new(),
            static_features: Vec::new(),
        }
    }

    pub fn patient_id(&self) -> &EntityId {
        &self.patient_id
    }

    /// Attaches drafts to this patient. Append-only, no deduplication.
    ///
    /// Equal timestamps keep their insertion order (stable sort).
    pub fn add_events<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = EventDraft>,
    {
        let n_before = self.temporal_events.len();

        for draft in events {
            match draft.attach(&self.patient_id) {
                AttachedEvent::Temporal(event) => self.temporal_events.push(event),
                AttachedEvent::Static(feature) => self.static_features.push(feature),
            }
        }

        let appended = &self.temporal_events[n_before..];
        let in_order = appended.windows(2).all(|w| w[0].timestamp <= w[1].timestamp)
            && match (n_before.checked_sub(1), appended.first()) {
                (Some(last), Some(first)) => {
                    self.temporal_events[last].timestamp <= first.timestamp
                }
                _ => true,
            };
        if !in_order {
            self.temporal_events.sort_by_key(|event| event.timestamp);
        }
    }

    /// Temporal events, ascending by timestamp.
    pub fn temporal_events(&self) -> &[TemporalEvent] {
        &self.temporal_events
    }

    pub fn static_events(&self) -> &[StaticFeature] {
        &self.static_features
    }

    /// Events with `start <= timestamp < end`. Empty when `start >= end`.
    pub fn events_between(&self, start: NaiveDateTime, end: NaiveDateTime) -> &[TemporalEvent] {
        if start >= end {
            return &[];
        }
        let lo = self.temporal_events.partition_point(|e| e.timestamp < start);
        let hi = self.temporal_events.partition_point(|e| e.timestamp < end);
        &self.temporal_events[lo..hi]
    }
}

/// Equal iff ids match and both collections hold the same records,
/// regardless of order.
impl PartialEq for Patient {
    fn eq(&self, other: &Self) -> bool {
        self.patient_id == other.patient_id
            && same_records(&self.temporal_events, &other.temporal_events)
            && same_records(&self.static_features, &other.static_features)
    }
}

fn same_records<T: PartialEq>(left: &[T], right: &[T]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut used = vec![false; right.len()];
    left.iter().all(|item| {
        let found = right
            .iter()
            .enumerate()
            .position(|(i, candidate)| !used[i] && candidate == item);
        match found {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::EventValue;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn add_events_splits_temporal_and_static() {
        let mut patient = Patient::new(1);
        patient.add_events(vec![
            EventDraft::temporal(day(2), "lab", 5.0),
            EventDraft::static_feature("sex", "male"),
        ]);

        assert_eq!(patient.temporal_events().len(), 1);
        assert_eq!(patient.static_events().len(), 1);
        assert_eq!(patient.temporal_events()[0].patient_id, EntityId::Int(1));
        assert_eq!(patient.static_events()[0].patient_id, EntityId::Int(1));
    }

    #[test]
    fn temporal_events_sorted_across_calls() {
        let mut patient = Patient::new("p");
        patient.add_events(vec![
            EventDraft::temporal(day(5), "lab", 1.0),
            EventDraft::temporal(day(1), "lab", 2.0),
        ]);
        patient.add_events(vec![EventDraft::temporal(day(3), "lab", 3.0)]);

        let days: Vec<_> = patient.temporal_events().iter().map(|e| e.timestamp).collect();
        assert_eq!(days, vec![day(1), day(3), day(5)]);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut patient = Patient::new(1);
        patient.add_events(vec![
            EventDraft::temporal(day(4), "lab", 1.0),
            EventDraft::temporal(day(2), "lab", 2.0),
            EventDraft::temporal(day(2), "lab", 3.0),
        ]);

        let values: Vec<_> = patient
            .temporal_events()
            .iter()
            .map(|e| e.value.clone())
            .collect();
        assert_eq!(
            values,
            vec![
                Some(EventValue::from(2.0)),
                Some(EventValue::from(3.0)),
                Some(EventValue::from(1.0)),
            ]
        );
    }

    #[test]
    fn add_events_does_not_deduplicate() {
        let mut patient = Patient::new(1);
        let draft = EventDraft::temporal(day(1), "lab", 1.0);
        patient.add_events(vec![draft.clone(), draft]);
        assert_eq!(patient.temporal_events().len(), 2);
    }

    #[test]
    fn events_between_is_half_open() {
        let mut patient = Patient::new(1);
        patient.add_events((1..=5).map(|d| EventDraft::temporal(day(d), "lab", d as f64)));

        let window = patient.events_between(day(2), day(4));
        let days: Vec<_> = window.iter().map(|e| e.timestamp).collect();
        assert_eq!(days, vec![day(2), day(3)]);

        assert!(patient.events_between(day(3), day(3)).is_empty());
        assert!(patient.events_between(day(4), day(2)).is_empty());
    }

    #[test]
    fn equality_ignores_event_order() {
        let mut a = Patient::new(1);
        a.add_events(vec![
            EventDraft::static_feature("sex", "female"),
            EventDraft::static_feature("region", "north"),
            EventDraft::temporal(day(1), "lab", 1.0),
        ]);

        let mut b = Patient::new(1);
        b.add_events(vec![
            EventDraft::temporal(day(1), "lab", 1.0),
            EventDraft::static_feature("region", "north"),
            EventDraft::static_feature("sex", "female"),
        ]);

        assert_eq!(a, b);
    }

    #[test]
    fn equality_respects_multiplicity_and_id() {
        let mut a = Patient::new(1);
        a.add_events(vec![
            EventDraft::temporal(day(1), "lab", 1.0),
            EventDraft::temporal(day(1), "lab", 1.0),
        ]);
        let mut b = Patient::new(1);
        b.add_events(vec![
            EventDraft::temporal(day(1), "lab", 1.0),
            EventDraft::temporal(day(1), "lab", 2.0),
        ]);
        assert_ne!(a, b);

        assert_ne!(Patient::new(1), Patient::new(2));
        assert_ne!(Patient::new(1), Patient::new("1"));
    }
}
