//! One-period-ahead revenue forecast.
//!
//! The prediction blends the historical average deal value (30%) with the
//! stage-weighted open pipeline (70%). The reported band is a fixed ±15%
//! around the prediction; it is not derived from the variance of the data and
//! is not a statistical confidence interval.
//!
//! Money outputs are rounded to cents (half away from zero). The band is taken
//! from the unrounded prediction before rounding, so
//! `confidence_low <= predicted_amount <= confidence_high` still holds.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use leadcast_core::{round_to_cents, Deal, DealRecord, DealRecordError, DealStage, PredictionFactors, RevenuePrediction};
use serde::Serialize;
use uuid::Uuid;

pub const HISTORICAL_WEIGHT: f64 = 0.3;
pub const PIPELINE_WEIGHT: f64 = 0.7;
pub const BAND_LOW: f64 = 0.85;
pub const BAND_HIGH: f64 = 1.15;
/// Weight for an open deal in a stage outside the known set.
pub const UNKNOWN_STAGE_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionDraft {
    pub prediction_date: NaiveDate,
    pub predicted_amount: f64,
    pub confidence_low: f64,
    pub confidence_high: f64,
    pub factors: PredictionFactors,
}

impl PredictionDraft {
    pub fn into_prediction(self, created_at: DateTime<Utc>) -> RevenuePrediction {
        RevenuePrediction {
            id: Uuid::new_v4(),
            prediction_date: self.prediction_date,
            predicted_amount: self.predicted_amount,
            confidence_low: self.confidence_low,
            confidence_high: self.confidence_high,
            factors: self.factors,
            created_at,
        }
    }
}

pub fn stage_weight(stage: &DealStage) -> f64 {
    match stage {
        DealStage::Set => 0.2,
        DealStage::Shown => 0.4,
        DealStage::Pitched => 0.6,
        DealStage::FollowUp => 0.8,
        _ => UNKNOWN_STAGE_WEIGHT,
    }
}

/// First day of the calendar month after `as_of`.
pub fn next_period_start(as_of: NaiveDate) -> NaiveDate {
    let (year, month) = if as_of.month() == 12 {
        (as_of.year() + 1, 1)
    } else {
        (as_of.year(), as_of.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).expect("day 1 exists in every month")
}

pub fn historical_average(historical: &[Deal]) -> f64 {
    if historical.is_empty() {
        return 0.0;
    }
    historical.iter().map(|d| d.amount).sum::<f64>() / historical.len() as f64
}

pub fn weighted_pipeline_value(pipeline: &[Deal]) -> f64 {
    pipeline
        .iter()
        .map(|d| d.amount * stage_weight(&d.stage))
        .sum()
}

pub fn generate_revenue_prediction(
    historical: &[Deal],
    pipeline: &[Deal],
    as_of: NaiveDate,
) -> PredictionDraft {
    let historical_average = historical_average(historical);
    let pipeline_value = weighted_pipeline_value(pipeline);
    let predicted = historical_average * HISTORICAL_WEIGHT + pipeline_value * PIPELINE_WEIGHT;

    PredictionDraft {
        prediction_date: next_period_start(as_of),
        predicted_amount: round_to_cents(predicted),
        confidence_low: round_to_cents(predicted * BAND_LOW),
        confidence_high: round_to_cents(predicted * BAND_HIGH),
        factors: PredictionFactors {
            historical_average,
            pipeline_value,
            pipeline_deals: pipeline.len(),
            historical_deals: historical.len(),
            skipped_deals: 0,
        },
    }
}

/// Splits raw records into valid deals and per-record rejections.
pub fn validate_deals(records: Vec<DealRecord>) -> (Vec<Deal>, Vec<DealRecordError>) {
    let mut deals = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();
    for record in records {
        match Deal::try_from(record) {
            Ok(deal) => deals.push(deal),
            Err(err) => rejected.push(err),
        }
    }
    (deals, rejected)
}
