pub mod entity;
pub mod event;
pub mod patient;
pub mod prediction_time;

pub use entity::*;
pub use event::{EventDraft, EventValue, StaticFeature, TemporalEvent};
pub use patient::Patient;
pub use prediction_time::*;
