use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::entity::EntityId;

/// Scalar carried by an event: a measurement or a categorical code.
///
/// Integers are kept exact; large integer codes do not fit losslessly in `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Boolean(bool),
    Integer(i64),
    Numeric(f64),
    Categorical(String),
}

impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Numeric(v) => write!(f, "{v}"),
            Self::Categorical(v) => f.write_str(v),
        }
    }
}

impl From<f64> for EventValue {
    fn from(v: f64) -> Self {
        Self::Numeric(v)
    }
}

impl From<i64> for EventValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for EventValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl EventValue {
    /// Numeric view of the value; integers beyond 2^53 round.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Numeric(v) => Some(*v),
            Self::Boolean(_) | Self::Categorical(_) => None,
        }
    }
}

impl From<bool> for EventValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for EventValue {
    fn from(v: &str) -> Self {
        Self::Categorical(v.to_string())
    }
}

/// A timestamped event attached to a patient.
///
/// Only built by [`super::Patient::add_events`], which stamps `patient_id`.
/// The id is a relation, never used for ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalEvent {
    pub patient_id: EntityId,
    pub timestamp: NaiveDateTime,
    pub source: String,
    pub source_subtype: Option<String>,
    pub value: Option<EventValue>,
    pub name: Option<String>,
}

/// A patient-level attribute with no timestamp. Visible at every prediction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticFeature {
    pub patient_id: EntityId,
    pub source: String,
    pub value: EventValue,
}

/// An event not yet attached to a patient.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDraft {
    Temporal {
        timestamp: NaiveDateTime,
        source: String,
        source_subtype: Option<String>,
        value: Option<EventValue>,
        name: Option<String>,
    },
    Static {
        source: String,
        value: EventValue,
    },
}

impl EventDraft {
    pub fn temporal(
        timestamp: NaiveDateTime,
        source: impl Into<String>,
        value: impl Into<EventValue>,
    ) -> Self {
        Self::Temporal {
            timestamp,
            source: source.into(),
            source_subtype: None,
            value: Some(value.into()),
            name: None,
        }
    }

    pub fn static_feature(source: impl Into<String>, value: impl Into<EventValue>) -> Self {
        Self::Static {
            source: source.into(),
            value: value.into(),
        }
    }

    /// Sets the source subtype. No-op on static drafts.
    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        if let Self::Temporal { source_subtype, .. } = &mut self {
            *source_subtype = Some(subtype.into());
        }
        self
    }

    /// Sets the display name. No-op on static drafts.
    pub fn with_name(mut self, display_name: impl Into<String>) -> Self {
        if let Self::Temporal { name, .. } = &mut self {
            *name = Some(display_name.into());
        }
        self
    }
}

/// Result of attaching a draft to a patient.
pub(crate) enum AttachedEvent {
    Temporal(TemporalEvent),
    Static(StaticFeature),
}

impl EventDraft {
    pub(crate) fn attach(self, patient_id: &EntityId) -> AttachedEvent {
        match self {
            Self::Temporal {
                timestamp,
                source,
                source_subtype,
                value,
                name,
            } => AttachedEvent::Temporal(TemporalEvent {
                patient_id: patient_id.clone(),
                timestamp,
                source,
                source_subtype,
                value,
                name,
            }),
            Self::Static { source, value } => AttachedEvent::Static(StaticFeature {
                patient_id: patient_id.clone(),
                source,
                value,
            }),
        }
    }
}
