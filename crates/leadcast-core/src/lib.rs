//! Core domain model for Leadcast: leads, activities, deals and the records
//! produced by scoring, forecasting and constraint analysis.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "leadcast-core";

/// A stored text value that does not belong to the enumerated set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value {value:?}")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownValue {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(
    /// Acquisition channel a lead came through.
    LeadSource, "lead source" {
        Referral => "referral",
        Website => "website",
        Linkedin => "linkedin",
        Facebook => "facebook",
        Google => "google",
        ColdCall => "cold_call",
        Other => "other",
    }
);

impl LeadSource {
    /// Folds a free-text source into a known channel, ignoring ASCII case.
    /// Anything unrecognized becomes [`LeadSource::Other`].
    pub fn from_raw(raw: &str) -> Self {
        raw.to_ascii_lowercase()
            .parse()
            .unwrap_or(LeadSource::Other)
    }
}

text_enum!(
    LeadStatus, "lead status" {
        New => "new",
        Contacted => "contacted",
        Qualified => "qualified",
        Set => "set",
        Closed => "closed",
        Lost => "lost",
    }
);

text_enum!(
    ActivityType, "activity type" {
        Call => "call",
        Email => "email",
        Text => "text",
        Appointment => "appointment",
    }
);

text_enum!(
    ActivityStatus, "activity status" {
        Completed => "completed",
        Scheduled => "scheduled",
        Cancelled => "cancelled",
    }
);

text_enum!(
    ConstraintImpact, "constraint impact" {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
);

impl ConstraintImpact {
    /// Higher is more severe.
    pub fn severity(self) -> u8 {
        match self {
            ConstraintImpact::Low => 0,
            ConstraintImpact::Medium => 1,
            ConstraintImpact::High => 2,
        }
    }
}

text_enum!(
    ConstraintStatus, "constraint status" {
        Active => "active",
        Monitoring => "monitoring",
        Resolved => "resolved",
    }
);

/// Pipeline stage of a deal. Stages outside the known set are kept verbatim so
/// that an open deal in an unexpected stage still counts toward the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DealStage {
    Set,
    Shown,
    Pitched,
    FollowUp,
    ClosedWon,
    ClosedLost,
    Unrecognized(String),
}

impl DealStage {
    pub fn as_str(&self) -> &str {
        match self {
            DealStage::Set => "set",
            DealStage::Shown => "shown",
            DealStage::Pitched => "pitched",
            DealStage::FollowUp => "follow_up",
            DealStage::ClosedWon => "closed_won",
            DealStage::ClosedLost => "closed_lost",
            DealStage::Unrecognized(raw) => raw,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, DealStage::ClosedWon | DealStage::ClosedLost)
    }
}

impl From<&str> for DealStage {
    fn from(raw: &str) -> Self {
        match raw {
            "set" => DealStage::Set,
            "shown" => DealStage::Shown,
            "pitched" => DealStage::Pitched,
            "follow_up" => DealStage::FollowUp,
            "closed_won" => DealStage::ClosedWon,
            "closed_lost" => DealStage::ClosedLost,
            other => DealStage::Unrecognized(other.to_string()),
        }
    }
}

impl From<String> for DealStage {
    fn from(raw: String) -> Self {
        DealStage::from(raw.as_str())
    }
}

impl From<DealStage> for String {
    fn from(stage: DealStage) -> Self {
        stage.as_str().to_string()
    }
}

impl fmt::Display for DealStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sales prospect. `source` keeps the text as it was recorded; use
/// [`Lead::source_channel`] for the folded channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub source: String,
    pub status: LeadStatus,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub notes: Option<String>,
    pub crm_id: Option<String>,
    pub ai_score: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn source_channel(&self) -> LeadSource {
        LeadSource::from_raw(&self.source)
    }

    /// The six contact fields that make up profile completeness.
    pub fn profile_fields(&self) -> [Option<&str>; 6] {
        [
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.email.as_deref(),
            self.phone.as_deref(),
            self.company.as_deref(),
            self.job_title.as_deref(),
        ]
    }

    pub fn filled_profile_fields(&self) -> usize {
        self.profile_fields()
            .iter()
            .filter(|field| field.is_some_and(|value| !value.is_empty()))
            .count()
    }
}

/// Input for creating a lead (seeding, imports).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLead {
    pub source: String,
    pub status: LeadStatus,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewLead {
    pub fn into_lead(self, now: DateTime<Utc>) -> Lead {
        Lead {
            id: Uuid::new_v4(),
            source: self.source,
            status: self.status,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            company: self.company,
            job_title: self.job_title,
            notes: self.notes,
            crm_id: None,
            ai_score: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub lead_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub status: ActivityStatus,
    pub duration: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Per-factor breakdown of a lead score. Each factor is within 0..=25.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub source: i32,
    pub engagement: i32,
    pub recency: i32,
    pub completeness: i32,
}

impl ScoreFactors {
    pub fn total(&self) -> i32 {
        self.source + self.engagement + self.recency + self.completeness
    }
}

/// Append-only record of one scoring run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadScoreHistory {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub score: i32,
    pub factors: ScoreFactors,
    pub created_at: DateTime<Utc>,
}

/// A deal row exactly as stored or synced, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealRecord {
    pub id: Uuid,
    pub lead_id: Option<Uuid>,
    pub stage: String,
    pub amount: String,
    pub close_date: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DealRecordError {
    #[error("deal {id}: amount {raw:?} is not a number")]
    NonNumericAmount { id: Uuid, raw: String },
    #[error("deal {id}: amount {amount} must be finite and non-negative")]
    AmountOutOfRange { id: Uuid, amount: f64 },
    #[error("deal {id}: close date {raw:?} is not a YYYY-MM-DD date")]
    InvalidCloseDate { id: Uuid, raw: String },
}

/// A validated pipeline opportunity. Amounts are in a single currency unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub lead_id: Option<Uuid>,
    pub stage: DealStage,
    pub amount: f64,
    pub close_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DealRecord> for Deal {
    type Error = DealRecordError;

    fn try_from(record: DealRecord) -> Result<Self, Self::Error> {
        let raw_amount = record.amount.trim();
        let amount: f64 = raw_amount
            .parse()
            .map_err(|_| DealRecordError::NonNumericAmount {
                id: record.id,
                raw: record.amount.clone(),
            })?;
        if !amount.is_finite() || amount < 0.0 {
            return Err(DealRecordError::AmountOutOfRange {
                id: record.id,
                amount,
            });
        }

        // A blank close date is treated as "not closed yet".
        let close_date = match record.close_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                DealRecordError::InvalidCloseDate {
                    id: record.id,
                    raw: raw.to_string(),
                }
            })?),
        };

        Ok(Deal {
            id: record.id,
            lead_id: record.lead_id,
            stage: DealStage::from(record.stage),
            amount,
            close_date,
            created_at: record.created_at,
        })
    }
}

/// Inputs that shaped a revenue prediction. Field names follow the JSON
/// stored in the `factors` column.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionFactors {
    pub historical_average: f64,
    pub pipeline_value: f64,
    pub pipeline_deals: usize,
    pub historical_deals: usize,
    #[serde(default)]
    pub skipped_deals: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenuePrediction {
    pub id: Uuid,
    pub prediction_date: NaiveDate,
    pub predicted_amount: f64,
    pub confidence_low: f64,
    pub confidence_high: f64,
    pub factors: PredictionFactors,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesConstraint {
    pub id: Uuid,
    pub issue: String,
    pub impact: ConstraintImpact,
    pub status: ConstraintStatus,
    pub recommendation: Option<String>,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SalesConstraint {
    /// Listing order: status (active first), then severity, then newest.
    pub fn listing_order(a: &SalesConstraint, b: &SalesConstraint) -> std::cmp::Ordering {
        status_rank(a.status)
            .cmp(&status_rank(b.status))
            .then_with(|| b.impact.severity().cmp(&a.impact.severity()))
            .then_with(|| b.created_at.cmp(&a.created_at))
    }
}

fn status_rank(status: ConstraintStatus) -> u8 {
    match status {
        ConstraintStatus::Active => 0,
        ConstraintStatus::Monitoring => 1,
        ConstraintStatus::Resolved => 2,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSalesConstraint {
    pub issue: String,
    pub impact: ConstraintImpact,
    pub status: ConstraintStatus,
    #[serde(default)]
    pub recommendation: Option<String>,
}

impl NewSalesConstraint {
    pub fn into_constraint(self, now: DateTime<Utc>) -> SalesConstraint {
        SalesConstraint {
            id: Uuid::new_v4(),
            issue: self.issue,
            impact: self.impact,
            status: self.status,
            recommendation: self.recommendation,
            resolution: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Status change for an existing constraint; the optional texts replace the
/// stored ones only when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesConstraintUpdate {
    pub status: ConstraintStatus,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
}

impl SalesConstraintUpdate {
    pub fn apply(&self, constraint: &mut SalesConstraint, now: DateTime<Utc>) {
        constraint.status = self.status;
        if let Some(recommendation) = self.recommendation.as_ref().filter(|r| !r.is_empty()) {
            constraint.recommendation = Some(recommendation.clone());
        }
        if let Some(resolution) = self.resolution.as_ref().filter(|r| !r.is_empty()) {
            constraint.resolution = Some(resolution.clone());
        }
        constraint.updated_at = now;
    }
}

/// Rounds half away from zero to two decimal places.
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).single().unwrap()
    }

    fn record(amount: &str, close_date: Option<&str>) -> DealRecord {
        DealRecord {
            id: Uuid::nil(),
            lead_id: None,
            stage: "pitched".into(),
            amount: amount.into(),
            close_date: close_date.map(Into::into),
            created_at: ts(),
        }
    }

    #[test]
    fn source_folding_ignores_case_and_defaults_to_other() {
        assert_eq!(LeadSource::from_raw("Referral"), LeadSource::Referral);
        assert_eq!(LeadSource::from_raw("LINKEDIN"), LeadSource::Linkedin);
        assert_eq!(LeadSource::from_raw("cold_call"), LeadSource::ColdCall);
        assert_eq!(LeadSource::from_raw("Trade Show"), LeadSource::Other);
        assert_eq!(LeadSource::from_raw(""), LeadSource::Other);
    }

    #[test]
    fn deal_stage_keeps_unknown_text() {
        assert_eq!(DealStage::from("follow_up"), DealStage::FollowUp);
        let odd = DealStage::from("negotiation");
        assert_eq!(odd, DealStage::Unrecognized("negotiation".into()));
        assert_eq!(odd.as_str(), "negotiation");
        assert!(!odd.is_closed());
        assert!(DealStage::ClosedLost.is_closed());
    }

    #[test]
    fn deal_record_validation() {
        let deal = Deal::try_from(record(" 1500.00 ", Some("2026-02-14"))).unwrap();
        assert_eq!(deal.amount, 1500.0);
        assert_eq!(deal.close_date, NaiveDate::from_ymd_opt(2026, 2, 14));

        assert!(matches!(
            Deal::try_from(record("12k", None)),
            Err(DealRecordError::NonNumericAmount { .. })
        ));
        assert!(matches!(
            Deal::try_from(record("-5", None)),
            Err(DealRecordError::AmountOutOfRange { .. })
        ));
        assert!(matches!(
            Deal::try_from(record("NaN", None)),
            Err(DealRecordError::AmountOutOfRange { .. })
        ));
        assert!(matches!(
            Deal::try_from(record("10", Some("14/02/2026"))),
            Err(DealRecordError::InvalidCloseDate { .. })
        ));
        assert_eq!(Deal::try_from(record("10", Some("  "))).unwrap().close_date, None);
    }

    #[test]
    fn completeness_counts_only_non_empty_fields() {
        let mut lead = NewLead {
            source: "website".into(),
            status: LeadStatus::New,
            first_name: Some("Ada".into()),
            last_name: Some(String::new()),
            email: Some("ada@example.com".into()),
            phone: None,
            company: None,
            job_title: Some("CTO".into()),
            notes: None,
        }
        .into_lead(ts());
        assert_eq!(lead.filled_profile_fields(), 3);
        lead.last_name = Some("Lovelace".into());
        assert_eq!(lead.filled_profile_fields(), 4);
    }

    #[test]
    fn constraint_listing_orders_by_status_then_severity() {
        let mk = |issue: &str, impact, status, minutes| SalesConstraint {
            id: Uuid::new_v4(),
            issue: issue.into(),
            impact,
            status,
            recommendation: None,
            resolution: None,
            created_at: ts() + chrono::Duration::minutes(minutes),
            updated_at: ts(),
        };
        let mut items = vec![
            mk("resolved", ConstraintImpact::High, ConstraintStatus::Resolved, 0),
            mk("medium", ConstraintImpact::Medium, ConstraintStatus::Active, 5),
            mk("old-high", ConstraintImpact::High, ConstraintStatus::Active, 1),
            mk("new-high", ConstraintImpact::High, ConstraintStatus::Active, 9),
            mk("watch", ConstraintImpact::Low, ConstraintStatus::Monitoring, 3),
        ];
        items.sort_by(SalesConstraint::listing_order);
        let order: Vec<_> = items.iter().map(|c| c.issue.as_str()).collect();
        assert_eq!(order, ["new-high", "old-high", "medium", "watch", "resolved"]);
    }

    #[test]
    fn prediction_factors_use_camel_case_json() {
        let json = serde_json::to_value(PredictionFactors {
            historical_average: 1000.0,
            pipeline_value: 1200.0,
            pipeline_deals: 1,
            historical_deals: 2,
            skipped_deals: 0,
        })
        .unwrap();
        assert_eq!(json["historicalAverage"], 1000.0);
        assert_eq!(json["pipelineDeals"], 1);
        assert_eq!(json["skippedDeals"], 0);
    }

    #[test]
    fn cents_rounding() {
        assert_eq!(round_to_cents(968.999_999_999_9), 969.0);
        assert_eq!(round_to_cents(0.125), 0.13);
        assert_eq!(round_to_cents(0.0), 0.0);
    }
}
