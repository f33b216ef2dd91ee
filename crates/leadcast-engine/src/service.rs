use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use leadcast_core::{
    Deal, DealRecord, DealStage, Lead, LeadScoreHistory, NewLead, NewSalesConstraint, RevenuePrediction,
    SalesConstraint, SalesConstraintUpdate, ScoreFactors,
};
use leadcast_storage::Store;
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::analytics::{
    conversion_analytics, engagement_analytics, top_engaged_lead_ids, ConversionAnalytics,
    EngagementAnalytics,
};
use crate::constraints::{analyze_sales_constraints, ACTIVITY_WINDOW_DAYS, DEAL_WINDOW_DAYS};
use crate::forecast::{generate_revenue_prediction, validate_deals};
use crate::scoring::compute_lead_score;
use crate::EngineError;

/// Result of scoring one lead, shaped for the JSON API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadScoreOutcome {
    pub lead: Lead,
    pub score_history: LeadScoreHistory,
    pub factors: ScoreFactors,
}

#[derive(Clone)]
pub struct PredictabilityService {
    store: Arc<dyn Store>,
}

impl PredictabilityService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn score_lead(&self, lead_id: Uuid) -> Result<LeadScoreOutcome, EngineError> {
        self.score_lead_at(lead_id, Utc::now()).await
    }

    pub async fn score_lead_at(
        &self,
        lead_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<LeadScoreOutcome, EngineError> {
        let span = info_span!("score_lead", %lead_id);
        self.score_lead_inner(lead_id, now).instrument(span).await
    }

    async fn score_lead_inner(
        &self,
        lead_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<LeadScoreOutcome, EngineError> {
        let lead = self
            .store
            .fetch_lead(lead_id)
            .await?
            .ok_or(EngineError::NotFound { entity: "lead", id: lead_id })?;
        let activities = self.store.activities_for_lead(lead_id).await?;
        let computed = compute_lead_score(&lead, &activities, now);

        // The lead can disappear between the read and the write.
        let scored = self
            .store
            .record_lead_score(lead_id, computed.factors, now)
            .await?
            .ok_or(EngineError::NotFound { entity: "lead", id: lead_id })?;
        debug!(score = computed.score, activities = activities.len(), "lead scored");

        Ok(LeadScoreOutcome {
            lead: scored.lead,
            score_history: scored.history,
            factors: computed.factors,
        })
    }

    /// Rescores every lead. Leads removed while the run is in progress are
    /// skipped.
    pub async fn score_all_leads(&self) -> Result<Vec<LeadScoreOutcome>, EngineError> {
        let now = Utc::now();
        let leads = self.store.list_leads_by_score().await?;
        let mut outcomes = Vec::with_capacity(leads.len());
        for lead in leads {
            match self.score_lead_at(lead.id, now).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) if err.is_not_found() => {
                    warn!(lead_id = %lead.id, "lead vanished before rescoring; skipping");
                }
                Err(err) => return Err(err),
            }
        }
        info!(scored = outcomes.len(), "rescored leads");
        Ok(outcomes)
    }

    pub async fn list_lead_scores(&self) -> Result<Vec<Lead>, EngineError> {
        Ok(self.store.list_leads_by_score().await?)
    }

    pub async fn score_history(&self, lead_id: Uuid) -> Result<Vec<LeadScoreHistory>, EngineError> {
        Ok(self.store.score_history(lead_id).await?)
    }

    pub async fn generate_prediction(&self) -> Result<RevenuePrediction, EngineError> {
        self.generate_prediction_at(Utc::now()).await
    }

    pub async fn generate_prediction_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<RevenuePrediction, EngineError> {
        let span = info_span!("generate_prediction");
        self.generate_prediction_inner(now).instrument(span).await
    }

    async fn generate_prediction_inner(
        &self,
        now: DateTime<Utc>,
    ) -> Result<RevenuePrediction, EngineError> {
        let (mut historical, rejected_closed) = validate_deals(self.store.closed_deals().await?);
        // A blank close date validates to `None`; such a deal is still open.
        historical.retain(|d| d.close_date.is_some());
        let (pipeline, rejected_open) = validate_deals(self.store.open_pipeline_deals().await?);

        let skipped = rejected_closed.len() + rejected_open.len();
        for err in rejected_closed.iter().chain(rejected_open.iter()) {
            warn!(error = %err, "skipping malformed deal record");
        }

        let mut draft = generate_revenue_prediction(&historical, &pipeline, now.date_naive());
        draft.factors.skipped_deals = skipped;
        let prediction = draft.into_prediction(now);
        self.store.insert_revenue_prediction(&prediction).await?;

        info!(
            prediction_date = %prediction.prediction_date,
            predicted_amount = prediction.predicted_amount,
            historical_deals = prediction.factors.historical_deals,
            pipeline_deals = prediction.factors.pipeline_deals,
            skipped_deals = skipped,
            "revenue prediction stored"
        );
        Ok(prediction)
    }

    pub async fn list_predictions(&self) -> Result<Vec<RevenuePrediction>, EngineError> {
        Ok(self.store.list_revenue_predictions().await?)
    }

    pub async fn analyze_constraints(&self) -> Result<Vec<SalesConstraint>, EngineError> {
        self.analyze_constraints_at(Utc::now()).await
    }

    /// Runs the detection rules and records each finding unless an unresolved
    /// constraint with the same issue is already on file.
    pub async fn analyze_constraints_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SalesConstraint>, EngineError> {
        let span = info_span!("analyze_constraints");
        self.analyze_constraints_inner(now).instrument(span).await
    }

    async fn analyze_constraints_inner(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SalesConstraint>, EngineError> {
        let activities = self
            .store
            .activities_since(now - Duration::days(ACTIVITY_WINDOW_DAYS))
            .await?;
        let records = self
            .store
            .deals_created_since(now - Duration::days(DEAL_WINDOW_DAYS))
            .await?;
        let deals = valid_deals(records);

        for detected in analyze_sales_constraints(&activities, &deals) {
            if self.store.find_unresolved_constraint(detected.issue).await?.is_some() {
                debug!(issue = detected.issue, "constraint already open");
                continue;
            }
            let constraint = detected.into_new().into_constraint(now);
            self.store.insert_constraint(&constraint).await?;
            info!(issue = detected.issue, impact = %detected.impact, "constraint recorded");
        }

        Ok(self.store.list_constraints().await?)
    }

    pub async fn list_constraints(&self) -> Result<Vec<SalesConstraint>, EngineError> {
        Ok(self.store.list_constraints().await?)
    }

    pub async fn add_constraint(
        &self,
        new: NewSalesConstraint,
    ) -> Result<SalesConstraint, EngineError> {
        if new.issue.trim().is_empty() {
            return Err(EngineError::InvalidInput("issue is required".to_string()));
        }
        let constraint = new.into_constraint(Utc::now());
        self.store.insert_constraint(&constraint).await?;
        Ok(constraint)
    }

    pub async fn update_constraint(
        &self,
        id: Uuid,
        update: SalesConstraintUpdate,
    ) -> Result<SalesConstraint, EngineError> {
        self.store
            .update_constraint(id, &update, Utc::now())
            .await?
            .ok_or(EngineError::NotFound { entity: "constraint", id })
    }

    pub async fn engagement_analytics(&self, days: i64) -> Result<EngagementAnalytics, EngineError> {
        self.engagement_analytics_at(days, Utc::now()).await
    }

    /// Activity counts and the most engaged leads over the last `days` days.
    pub async fn engagement_analytics_at(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<EngagementAnalytics, EngineError> {
        let since = window_start(now, days)?;
        let activities = self.store.activities_since(since).await?;
        let top_ids = top_engaged_lead_ids(&activities, since, now)
            .into_iter()
            .map(|(id, _)| id)
            .collect::<Vec<_>>();
        let leads = self.store.leads_by_ids(&top_ids).await?;
        debug!(days, activities = activities.len(), "engagement analytics");
        Ok(engagement_analytics(&activities, &leads, since, now))
    }

    pub async fn conversion_analytics(&self, days: i64) -> Result<ConversionAnalytics, EngineError> {
        self.conversion_analytics_at(days, Utc::now()).await
    }

    /// Per-source conversion for leads and deals created in the last `days`
    /// days, with average time to close over all won deals.
    pub async fn conversion_analytics_at(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<ConversionAnalytics, EngineError> {
        let since = window_start(now, days)?;
        let window_leads = self.store.leads_created_since(since).await?;
        let window_leads = window_leads
            .into_iter()
            .filter(|l| l.created_at <= now)
            .collect::<Vec<_>>();
        let window_deals = valid_deals(self.store.deals_created_since(since).await?)
            .into_iter()
            .filter(|d| d.created_at <= now)
            .collect::<Vec<_>>();
        let mut closed = valid_deals(self.store.closed_deals().await?);
        closed.retain(|d| d.close_date.is_some());

        let mut lead_ids = window_deals
            .iter()
            .chain(closed.iter())
            .filter(|d| d.stage == DealStage::ClosedWon)
            .filter_map(|d| d.lead_id)
            .collect::<Vec<_>>();
        lead_ids.sort();
        lead_ids.dedup();
        let deal_leads = self.store.leads_by_ids(&lead_ids).await?;

        debug!(days, leads = window_leads.len(), deals = window_deals.len(), "conversion analytics");
        Ok(conversion_analytics(&window_leads, &window_deals, &closed, &deal_leads))
    }

    /// Inserts each lead unless one with the same email exists, and scores
    /// the ones that were created. Returns the created leads with their
    /// scores applied.
    pub async fn seed_leads(&self, leads: Vec<NewLead>) -> Result<Vec<Lead>, EngineError> {
        let mut created = Vec::new();
        for new in leads {
            let (lead, inserted) = self.store.find_or_create_lead(new).await?;
            if !inserted {
                debug!(lead_id = %lead.id, "lead already present");
                continue;
            }
            let outcome = self.score_lead(lead.id).await?;
            created.push(outcome.lead);
        }
        info!(created = created.len(), "seeded sample leads");
        Ok(created)
    }
}

fn window_start(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>, EngineError> {
    if days <= 0 {
        return Err(EngineError::InvalidInput(format!(
            "days must be a positive number, got {days}"
        )));
    }
    Duration::try_days(days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| EngineError::InvalidInput(format!("days is out of range: {days}")))
}

fn valid_deals(records: Vec<DealRecord>) -> Vec<Deal> {
    let (deals, rejected) = validate_deals(records);
    for err in &rejected {
        warn!(error = %err, "skipping malformed deal record");
    }
    deals
}
