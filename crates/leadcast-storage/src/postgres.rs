use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadcast_core::{
    Activity, DealRecord, Lead, LeadScoreHistory, NewLead, PredictionFactors, RevenuePrediction,
    SalesConstraint, SalesConstraintUpdate, ScoreFactors,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::{ConstraintStore, DealStore, LeadStore, ScoredLead, StoreError};

const LEAD_COLUMNS: &str = "id, source, status, first_name, last_name, email, phone, company, \
                            job_title, notes, crm_id, ai_score, created_at, updated_at";

const ACTIVITY_COLUMNS: &str = "id, lead_id, type, status, duration, created_at";

// Amount and close date leave the database as text; validation happens in the engine.
const DEAL_COLUMNS: &str =
    "id, lead_id, stage, amount::text AS amount, close_date::text AS close_date, created_at";

const PREDICTION_COLUMNS: &str = "id, prediction_date, predicted_amount::float8 AS predicted_amount, \
                                  confidence_low::float8 AS confidence_low, \
                                  confidence_high::float8 AS confidence_high, factors, created_at";

const CONSTRAINT_COLUMNS: &str =
    "id, issue, impact, status, recommendation, resolution, created_at, updated_at";

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn write_lead_score(
        &self,
        lead_id: Uuid,
        factors: ScoreFactors,
        scored_at: DateTime<Utc>,
    ) -> Result<Option<ScoredLead>, StoreError> {
        let score = factors.total();
        let mut tx = self.pool.begin().await?;

        // The UPDATE takes the row lock, so concurrent writers for the same
        // lead commit one after the other.
        let sql = format!(
            "UPDATE leads SET ai_score = $2, updated_at = $3 WHERE id = $1 RETURNING {LEAD_COLUMNS}"
        );
        let Some(row) = sqlx::query(&sql)
            .bind(lead_id)
            .bind(score)
            .bind(scored_at)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };
        let lead = lead_from_row(&row)?;

        let history = LeadScoreHistory {
            id: Uuid::new_v4(),
            lead_id,
            score,
            factors,
            created_at: scored_at,
        };
        sqlx::query(
            r#"
            INSERT INTO lead_scores_history (id, lead_id, score, factors, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(history.id)
        .bind(history.lead_id)
        .bind(history.score)
        .bind(Json(history.factors))
        .bind(history.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(score, "lead score committed");
        Ok(Some(ScoredLead { lead, history }))
    }
}

fn lead_from_row(row: &PgRow) -> Result<Lead, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Lead {
        id: row.try_get("id")?,
        source: row.try_get("source")?,
        status: status.parse()?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        company: row.try_get("company")?,
        job_title: row.try_get("job_title")?,
        notes: row.try_get("notes")?,
        crm_id: row.try_get("crm_id")?,
        ai_score: row.try_get("ai_score")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn activity_from_row(row: &PgRow) -> Result<Activity, StoreError> {
    let kind: String = row.try_get("type")?;
    let status: String = row.try_get("status")?;
    Ok(Activity {
        id: row.try_get("id")?,
        lead_id: row.try_get("lead_id")?,
        kind: kind.parse()?,
        status: status.parse()?,
        duration: row.try_get("duration")?,
        created_at: row.try_get("created_at")?,
    })
}

fn deal_from_row(row: &PgRow) -> Result<DealRecord, StoreError> {
    Ok(DealRecord {
        id: row.try_get("id")?,
        lead_id: row.try_get("lead_id")?,
        stage: row.try_get("stage")?,
        amount: row.try_get("amount")?,
        close_date: row.try_get("close_date")?,
        created_at: row.try_get("created_at")?,
    })
}

fn history_from_row(row: &PgRow) -> Result<LeadScoreHistory, StoreError> {
    let factors: Json<ScoreFactors> = row.try_get("factors")?;
    Ok(LeadScoreHistory {
        id: row.try_get("id")?,
        lead_id: row.try_get("lead_id")?,
        score: row.try_get("score")?,
        factors: factors.0,
        created_at: row.try_get("created_at")?,
    })
}

fn prediction_from_row(row: &PgRow) -> Result<RevenuePrediction, StoreError> {
    let factors: Json<PredictionFactors> = row.try_get("factors")?;
    Ok(RevenuePrediction {
        id: row.try_get("id")?,
        prediction_date: row.try_get("prediction_date")?,
        predicted_amount: row.try_get("predicted_amount")?,
        confidence_low: row.try_get("confidence_low")?,
        confidence_high: row.try_get("confidence_high")?,
        factors: factors.0,
        created_at: row.try_get("created_at")?,
    })
}

fn constraint_from_row(row: &PgRow) -> Result<SalesConstraint, StoreError> {
    let impact: String = row.try_get("impact")?;
    let status: String = row.try_get("status")?;
    Ok(SalesConstraint {
        id: row.try_get("id")?,
        issue: row.try_get("issue")?,
        impact: impact.parse()?,
        status: status.parse()?,
        recommendation: row.try_get("recommendation")?,
        resolution: row.try_get("resolution")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl LeadStore for PgStore {
    async fn fetch_lead(&self, lead_id: Uuid) -> Result<Option<Lead>, StoreError> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(lead_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(lead_from_row).transpose()
    }

    async fn list_leads_by_score(&self) -> Result<Vec<Lead>, StoreError> {
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads ORDER BY ai_score DESC NULLS LAST, created_at DESC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(lead_from_row).collect()
    }

    async fn find_or_create_lead(&self, lead: NewLead) -> Result<(Lead, bool), StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(email) = lead.email.as_deref() {
            let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE email = $1 LIMIT 1");
            if let Some(row) = sqlx::query(&sql)
                .bind(email)
                .fetch_optional(&mut *tx)
                .await?
            {
                let existing = lead_from_row(&row)?;
                tx.commit().await?;
                return Ok((existing, false));
            }
        }

        let created = lead.into_lead(Utc::now());
        sqlx::query(
            r#"
            INSERT INTO leads (id, source, status, first_name, last_name, email, phone,
                               company, job_title, notes, crm_id, ai_score, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(created.id)
        .bind(&created.source)
        .bind(created.status.as_str())
        .bind(&created.first_name)
        .bind(&created.last_name)
        .bind(&created.email)
        .bind(&created.phone)
        .bind(&created.company)
        .bind(&created.job_title)
        .bind(&created.notes)
        .bind(&created.crm_id)
        .bind(created.ai_score)
        .bind(created.created_at)
        .bind(created.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(lead_id = %created.id, "inserted lead");
        Ok((created, true))
    }

    async fn leads_created_since(&self, since: DateTime<Utc>) -> Result<Vec<Lead>, StoreError> {
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE created_at >= $1 ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql).bind(since).fetch_all(&self.pool).await?;
        rows.iter().map(lead_from_row).collect()
    }

    async fn leads_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Lead>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ANY($1)");
        let rows = sqlx::query(&sql).bind(ids).fetch_all(&self.pool).await?;
        rows.iter().map(lead_from_row).collect()
    }

    async fn activities_for_lead(&self, lead_id: Uuid) -> Result<Vec<Activity>, StoreError> {
        let sql = format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE lead_id = $1");
        let rows = sqlx::query(&sql).bind(lead_id).fetch_all(&self.pool).await?;
        rows.iter().map(activity_from_row).collect()
    }

    async fn activities_since(&self, since: DateTime<Utc>) -> Result<Vec<Activity>, StoreError> {
        let sql = format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE created_at >= $1 ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql).bind(since).fetch_all(&self.pool).await?;
        rows.iter().map(activity_from_row).collect()
    }

    async fn record_lead_score(
        &self,
        lead_id: Uuid,
        factors: ScoreFactors,
        scored_at: DateTime<Utc>,
    ) -> Result<Option<ScoredLead>, StoreError> {
        let span = info_span!("record_lead_score", %lead_id);
        self.write_lead_score(lead_id, factors, scored_at)
            .instrument(span)
            .await
    }

    async fn score_history(&self, lead_id: Uuid) -> Result<Vec<LeadScoreHistory>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, lead_id, score, factors, created_at
              FROM lead_scores_history
             WHERE lead_id = $1
             ORDER BY created_at DESC
            "#,
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(history_from_row).collect()
    }
}

#[async_trait]
impl DealStore for PgStore {
    async fn closed_deals(&self) -> Result<Vec<DealRecord>, StoreError> {
        let sql = format!(
            "SELECT {DEAL_COLUMNS} FROM deals WHERE close_date IS NOT NULL ORDER BY close_date ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(deal_from_row).collect()
    }

    async fn open_pipeline_deals(&self) -> Result<Vec<DealRecord>, StoreError> {
        let sql = format!(
            "SELECT {DEAL_COLUMNS} FROM deals WHERE stage NOT IN ('closed_won', 'closed_lost')"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(deal_from_row).collect()
    }

    async fn deals_created_since(&self, since: DateTime<Utc>) -> Result<Vec<DealRecord>, StoreError> {
        let sql = format!("SELECT {DEAL_COLUMNS} FROM deals WHERE created_at >= $1");
        let rows = sqlx::query(&sql).bind(since).fetch_all(&self.pool).await?;
        rows.iter().map(deal_from_row).collect()
    }

    async fn insert_revenue_prediction(&self, prediction: &RevenuePrediction) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO revenue_predictions (id, prediction_date, predicted_amount, confidence_low,
                                             confidence_high, factors, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(prediction.id)
        .bind(prediction.prediction_date)
        .bind(prediction.predicted_amount)
        .bind(prediction.confidence_low)
        .bind(prediction.confidence_high)
        .bind(Json(prediction.factors))
        .bind(prediction.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_revenue_predictions(&self) -> Result<Vec<RevenuePrediction>, StoreError> {
        let sql = format!(
            "SELECT {PREDICTION_COLUMNS} FROM revenue_predictions ORDER BY prediction_date ASC, created_at ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(prediction_from_row).collect()
    }
}

#[async_trait]
impl ConstraintStore for PgStore {
    async fn list_constraints(&self) -> Result<Vec<SalesConstraint>, StoreError> {
        let sql = format!(
            r#"
            SELECT {CONSTRAINT_COLUMNS}
              FROM sales_constraints
             ORDER BY CASE status WHEN 'active' THEN 0 WHEN 'monitoring' THEN 1 ELSE 2 END,
                      CASE impact WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END,
                      created_at DESC
            "#
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(constraint_from_row).collect()
    }

    async fn find_unresolved_constraint(&self, issue: &str) -> Result<Option<SalesConstraint>, StoreError> {
        let sql = format!(
            "SELECT {CONSTRAINT_COLUMNS} FROM sales_constraints \
             WHERE issue = $1 AND status <> 'resolved' LIMIT 1"
        );
        let row = sqlx::query(&sql).bind(issue).fetch_optional(&self.pool).await?;
        row.as_ref().map(constraint_from_row).transpose()
    }

    async fn insert_constraint(&self, constraint: &SalesConstraint) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sales_constraints (id, issue, impact, status, recommendation, resolution,
                                           created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(constraint.id)
        .bind(&constraint.issue)
        .bind(constraint.impact.as_str())
        .bind(constraint.status.as_str())
        .bind(&constraint.recommendation)
        .bind(&constraint.resolution)
        .bind(constraint.created_at)
        .bind(constraint.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_constraint(
        &self,
        id: Uuid,
        update: &SalesConstraintUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<SalesConstraint>, StoreError> {
        let sql = format!(
            r#"
            UPDATE sales_constraints
               SET status = $2,
                   recommendation = COALESCE(NULLIF($3, ''), recommendation),
                   resolution = COALESCE(NULLIF($4, ''), resolution),
                   updated_at = $5
             WHERE id = $1
            RETURNING {CONSTRAINT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(update.status.as_str())
            .bind(update.recommendation.as_deref())
            .bind(update.resolution.as_deref())
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(constraint_from_row).transpose()
    }
}
