//! Storage seam for Leadcast: the traits the engines read and write through,
//! plus a Postgres implementation and an in-memory one.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadcast_core::{
    Activity, DealRecord, Lead, LeadScoreHistory, NewLead, RevenuePrediction, SalesConstraint,
    SalesConstraintUpdate, ScoreFactors, UnknownValue,
};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const CRATE_NAME: &str = "leadcast-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("invalid stored value: {0}")]
    InvalidValue(#[from] UnknownValue),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Lead row after a score update, with the history entry written alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredLead {
    pub lead: Lead,
    pub history: LeadScoreHistory,
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn fetch_lead(&self, lead_id: Uuid) -> Result<Option<Lead>, StoreError>;

    /// All leads, highest score first; unscored leads last.
    async fn list_leads_by_score(&self) -> Result<Vec<Lead>, StoreError>;

    /// Returns the existing lead with the same email, or inserts a new one.
    /// The flag is `true` when a row was created.
    async fn find_or_create_lead(&self, lead: NewLead) -> Result<(Lead, bool), StoreError>;

    /// Leads created at or after `since`, oldest first.
    async fn leads_created_since(&self, since: DateTime<Utc>) -> Result<Vec<Lead>, StoreError>;

    /// Leads with the given ids, in no particular order. Unknown ids are ignored.
    async fn leads_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Lead>, StoreError>;

    async fn activities_for_lead(&self, lead_id: Uuid) -> Result<Vec<Activity>, StoreError>;

    async fn activities_since(&self, since: DateTime<Utc>) -> Result<Vec<Activity>, StoreError>;

    /// Overwrites the lead's score and appends a history entry as one atomic
    /// write. Returns `None` when the lead does not exist.
    async fn record_lead_score(
        &self,
        lead_id: Uuid,
        factors: ScoreFactors,
        scored_at: DateTime<Utc>,
    ) -> Result<Option<ScoredLead>, StoreError>;

    /// Newest first.
    async fn score_history(&self, lead_id: Uuid) -> Result<Vec<LeadScoreHistory>, StoreError>;
}

#[async_trait]
pub trait DealStore: Send + Sync {
    /// Deals with a close date, oldest close first.
    async fn closed_deals(&self) -> Result<Vec<DealRecord>, StoreError>;

    /// Deals whose stage is neither `closed_won` nor `closed_lost`.
    async fn open_pipeline_deals(&self) -> Result<Vec<DealRecord>, StoreError>;

    async fn deals_created_since(&self, since: DateTime<Utc>) -> Result<Vec<DealRecord>, StoreError>;

    async fn insert_revenue_prediction(&self, prediction: &RevenuePrediction) -> Result<(), StoreError>;

    /// Ordered by target period, oldest first.
    async fn list_revenue_predictions(&self) -> Result<Vec<RevenuePrediction>, StoreError>;
}

#[async_trait]
pub trait ConstraintStore: Send + Sync {
    async fn list_constraints(&self) -> Result<Vec<SalesConstraint>, StoreError>;

    async fn find_unresolved_constraint(&self, issue: &str) -> Result<Option<SalesConstraint>, StoreError>;

    async fn insert_constraint(&self, constraint: &SalesConstraint) -> Result<(), StoreError>;

    async fn update_constraint(
        &self,
        id: Uuid,
        update: &SalesConstraintUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<SalesConstraint>, StoreError>;
}

/// Everything the services need from a backend.
pub trait Store: LeadStore + DealStore + ConstraintStore {}

impl<T> Store for T where T: LeadStore + DealStore + ConstraintStore {}
