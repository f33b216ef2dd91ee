use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadcast_core::{
    Activity, DealRecord, Lead, LeadScoreHistory, NewLead, RevenuePrediction, SalesConstraint,
    SalesConstraintUpdate, ScoreFactors,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{ConstraintStore, DealStore, LeadStore, ScoredLead, StoreError};

/// Process-local store used by tests and demo runs. Every operation holds a
/// single lock, which makes the score + history write atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    leads: Vec<Lead>,
    activities: Vec<Activity>,
    deals: Vec<DealRecord>,
    history: Vec<LeadScoreHistory>,
    predictions: Vec<RevenuePrediction>,
    constraints: Vec<SalesConstraint>,
    fail_history_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_lead(&self, lead: Lead) {
        self.state.lock().await.leads.push(lead);
    }

    pub async fn insert_activity(&self, activity: Activity) {
        self.state.lock().await.activities.push(activity);
    }

    pub async fn insert_deal(&self, deal: DealRecord) {
        self.state.lock().await.deals.push(deal);
    }

    /// Makes history appends fail, to exercise the all-or-nothing score write.
    pub async fn set_history_write_failure(&self, fail: bool) {
        self.state.lock().await.fail_history_writes = fail;
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn fetch_lead(&self, lead_id: Uuid) -> Result<Option<Lead>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.leads.iter().find(|l| l.id == lead_id).cloned())
    }

    async fn list_leads_by_score(&self) -> Result<Vec<Lead>, StoreError> {
        let mut leads = self.state.lock().await.leads.clone();
        // `None` sorts below every `Some`, so reversing puts unscored leads last.
        leads.sort_by(|a, b| {
            b.ai_score
                .cmp(&a.ai_score)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(leads)
    }

    async fn find_or_create_lead(&self, lead: NewLead) -> Result<(Lead, bool), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(email) = lead.email.as_deref() {
            if let Some(existing) = state
                .leads
                .iter()
                .find(|l| l.email.as_deref() == Some(email))
            {
                return Ok((existing.clone(), false));
            }
        }
        let created = lead.into_lead(Utc::now());
        state.leads.push(created.clone());
        Ok((created, true))
    }

    async fn leads_created_since(&self, since: DateTime<Utc>) -> Result<Vec<Lead>, StoreError> {
        let state = self.state.lock().await;
        let mut leads = state
            .leads
            .iter()
            .filter(|l| l.created_at >= since)
            .cloned()
            .collect::<Vec<_>>();
        leads.sort_by_key(|l| l.created_at);
        Ok(leads)
    }

    async fn leads_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Lead>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .leads
            .iter()
            .filter(|l| ids.contains(&l.id))
            .cloned()
            .collect())
    }

    async fn activities_for_lead(&self, lead_id: Uuid) -> Result<Vec<Activity>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .activities
            .iter()
            .filter(|a| a.lead_id == Some(lead_id))
            .cloned()
            .collect())
    }

    async fn activities_since(&self, since: DateTime<Utc>) -> Result<Vec<Activity>, StoreError> {
        let state = self.state.lock().await;
        let mut activities = state
            .activities
            .iter()
            .filter(|a| a.created_at >= since)
            .cloned()
            .collect::<Vec<_>>();
        activities.sort_by_key(|a| a.created_at);
        Ok(activities)
    }

    async fn record_lead_score(
        &self,
        lead_id: Uuid,
        factors: ScoreFactors,
        scored_at: DateTime<Utc>,
    ) -> Result<Option<ScoredLead>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(idx) = state.leads.iter().position(|l| l.id == lead_id) else {
            return Ok(None);
        };
        if state.fail_history_writes {
            return Err(StoreError::Unavailable(
                "lead_scores_history rejected the write".to_string(),
            ));
        }

        let score = factors.total();
        let history = LeadScoreHistory {
            id: Uuid::new_v4(),
            lead_id,
            score,
            factors,
            created_at: scored_at,
        };
        let lead = &mut state.leads[idx];
        lead.ai_score = Some(score);
        lead.updated_at = scored_at;
        let lead = lead.clone();
        state.history.push(history.clone());
        Ok(Some(ScoredLead { lead, history }))
    }

    async fn score_history(&self, lead_id: Uuid) -> Result<Vec<LeadScoreHistory>, StoreError> {
        let state = self.state.lock().await;
        // Appended in time order; walk backwards for newest first.
        Ok(state
            .history
            .iter()
            .rev()
            .filter(|h| h.lead_id == lead_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DealStore for MemoryStore {
    async fn closed_deals(&self) -> Result<Vec<DealRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut deals = state
            .deals
            .iter()
            .filter(|d| d.close_date.as_deref().is_some_and(|c| !c.trim().is_empty()))
            .cloned()
            .collect::<Vec<_>>();
        deals.sort_by(|a, b| a.close_date.cmp(&b.close_date));
        Ok(deals)
    }

    async fn open_pipeline_deals(&self) -> Result<Vec<DealRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .deals
            .iter()
            .filter(|d| d.stage != "closed_won" && d.stage != "closed_lost")
            .cloned()
            .collect())
    }

    async fn deals_created_since(&self, since: DateTime<Utc>) -> Result<Vec<DealRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .deals
            .iter()
            .filter(|d| d.created_at >= since)
            .cloned()
            .collect())
    }

    async fn insert_revenue_prediction(&self, prediction: &RevenuePrediction) -> Result<(), StoreError> {
        self.state.lock().await.predictions.push(prediction.clone());
        Ok(())
    }

    async fn list_revenue_predictions(&self) -> Result<Vec<RevenuePrediction>, StoreError> {
        let mut predictions = self.state.lock().await.predictions.clone();
        predictions.sort_by(|a, b| {
            a.prediction_date
                .cmp(&b.prediction_date)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(predictions)
    }
}

#[async_trait]
impl ConstraintStore for MemoryStore {
    async fn list_constraints(&self) -> Result<Vec<SalesConstraint>, StoreError> {
        let mut constraints = self.state.lock().await.constraints.clone();
        constraints.sort_by(SalesConstraint::listing_order);
        Ok(constraints)
    }

    async fn find_unresolved_constraint(&self, issue: &str) -> Result<Option<SalesConstraint>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .constraints
            .iter()
            .find(|c| c.issue == issue && c.status != leadcast_core::ConstraintStatus::Resolved)
            .cloned())
    }

    async fn insert_constraint(&self, constraint: &SalesConstraint) -> Result<(), StoreError> {
        self.state.lock().await.constraints.push(constraint.clone());
        Ok(())
    }

    async fn update_constraint(
        &self,
        id: Uuid,
        update: &SalesConstraintUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<SalesConstraint>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.constraints.iter_mut().find(|c| c.id == id).map(|c| {
            update.apply(c, now);
            c.clone()
        }))
    }
}
