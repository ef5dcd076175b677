pub mod config;
pub mod models;
pub mod unpack;
pub mod windowing;
pub mod outcome;
pub mod filtering;
pub mod cohort;
pub mod db;

use tracing_subscriber::EnvFilter;

pub use cohort::{build_dataset, Cohort, CohortDefinition, Dataset, DatasetError};
pub use config::WindowConfig;
pub use models::{EntityId, EventDraft, EventValue, Patient, PredictionTime};
pub use outcome::OutcomeTimestamps;
pub use unpack::unpack_patients;

/// Installs the global tracing subscriber. `RUST_LOG` wins over the default
/// filter. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }
}
