//! Lead scoring, revenue prediction, constraint analysis and pipeline
//! analytics.
//!
//! The math lives in [`scoring`], [`forecast`], [`constraints`] and
//! [`analytics`] and does no I/O. [`PredictabilityService`] loads inputs through a
//! [`leadcast_storage::Store`], runs the math and persists the results.

pub mod analytics;
pub mod config;
pub mod constraints;
pub mod forecast;
pub mod schedule;
pub mod scoring;
pub mod seed;
pub mod service;

use leadcast_storage::StoreError;
use thiserror::Error;
use uuid::Uuid;

pub use analytics::{
    ConversionAnalytics, EngagementAnalytics, CONVERSION_WINDOW_DAYS, ENGAGEMENT_WINDOW_DAYS,
};
pub use config::EngineConfig;
pub use forecast::{generate_revenue_prediction, PredictionDraft};
pub use schedule::maybe_build_scheduler;
pub use scoring::{compute_lead_score, LeadScore};
pub use seed::{load_sample_leads, seed_sample_leads};
pub use service::{LeadScoreOutcome, PredictabilityService};

pub const CRATE_NAME: &str = "leadcast-engine";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }
}
