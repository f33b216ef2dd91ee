//! Read-only engagement and conversion summaries over a trailing window.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use leadcast_core::{round_to_cents, Activity, ActivityType, Deal, DealStage, Lead};
use serde::Serialize;
use uuid::Uuid;

pub const ENGAGEMENT_WINDOW_DAYS: i64 = 30;
pub const CONVERSION_WINDOW_DAYS: i64 = 90;

const TOP_ENGAGED_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementAnalytics {
    pub activities_by_type: Vec<TypeCount>,
    pub activities_by_day: Vec<DayCount>,
    pub top_engaged_leads: Vec<EngagedLead>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagedLead {
    pub lead_id: Uuid,
    pub activity_count: usize,
    /// `None` when the lead row is gone but its activities remain.
    pub lead: Option<LeadSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadSummary {
    pub id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub ai_score: Option<i32>,
}

impl From<&Lead> for LeadSummary {
    fn from(lead: &Lead) -> Self {
        Self {
            id: lead.id,
            first_name: lead.first_name.clone(),
            last_name: lead.last_name.clone(),
            email: lead.email.clone(),
            company: lead.company.clone(),
            ai_score: lead.ai_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionAnalytics {
    pub conversion_rates: Vec<SourceConversion>,
    pub avg_time_to_close: Vec<SourceCloseTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceConversion {
    pub source: String,
    pub total_leads: usize,
    pub won_deals: usize,
    pub total_revenue: f64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCloseTime {
    pub source: String,
    pub avg_days_to_close: f64,
}

/// Lead ids of the most active leads in the window, busiest first.
pub fn top_engaged_lead_ids(
    activities: &[Activity],
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<(Uuid, usize)> {
    let mut per_lead: HashMap<Uuid, usize> = HashMap::new();
    for activity in in_window(activities, since, now) {
        if let Some(lead_id) = activity.lead_id {
            *per_lead.entry(lead_id).or_default() += 1;
        }
    }
    let mut ranked = per_lead.into_iter().collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_ENGAGED_LIMIT);
    ranked
}

/// Counts activities created in `[since, now]` by type and by calendar day
/// (UTC), and attaches lead details to the busiest leads. `leads` only needs
/// to contain the leads named by [`top_engaged_lead_ids`].
pub fn engagement_analytics(
    activities: &[Activity],
    leads: &[Lead],
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> EngagementAnalytics {
    let mut by_type: BTreeMap<&'static str, (ActivityType, usize)> = BTreeMap::new();
    let mut by_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for activity in in_window(activities, since, now) {
        by_type.entry(activity.kind.as_str()).or_insert((activity.kind, 0)).1 += 1;
        *by_day.entry(activity.created_at.date_naive()).or_default() += 1;
    }

    let top_engaged_leads = top_engaged_lead_ids(activities, since, now)
        .into_iter()
        .map(|(lead_id, activity_count)| EngagedLead {
            lead_id,
            activity_count,
            lead: leads.iter().find(|l| l.id == lead_id).map(LeadSummary::from),
        })
        .collect();

    EngagementAnalytics {
        activities_by_type: by_type
            .into_values()
            .map(|(kind, count)| TypeCount { kind, count })
            .collect(),
        activities_by_day: by_day
            .into_iter()
            .map(|(date, count)| DayCount { date, count })
            .collect(),
        top_engaged_leads,
    }
}

/// Per-source conversion over the window plus the all-time average days from
/// lead creation to a won close.
///
/// `window_leads` are the leads created in the window and `window_deals` the
/// deals created in it. `closed_deals` is every deal with a close date;
/// `deal_leads` must contain the leads those deals point at. Deals without a
/// known lead are left out, as are sources with no leads in the window.
pub fn conversion_analytics(
    window_leads: &[Lead],
    window_deals: &[Deal],
    closed_deals: &[Deal],
    deal_leads: &[Lead],
) -> ConversionAnalytics {
    let lead_by_id = deal_leads.iter().map(|l| (l.id, l)).collect::<HashMap<_, _>>();

    let mut leads_per_source: BTreeMap<&str, usize> = BTreeMap::new();
    for lead in window_leads {
        *leads_per_source.entry(lead.source.as_str()).or_default() += 1;
    }

    let mut won_per_source: HashMap<&str, (usize, f64)> = HashMap::new();
    for deal in window_deals.iter().filter(|d| d.stage == DealStage::ClosedWon) {
        let Some(lead) = deal.lead_id.and_then(|id| lead_by_id.get(&id)) else {
            continue;
        };
        let entry = won_per_source.entry(lead.source.as_str()).or_default();
        entry.0 += 1;
        entry.1 += deal.amount;
    }

    let conversion_rates = leads_per_source
        .into_iter()
        .map(|(source, total_leads)| {
            let (won_deals, revenue) = won_per_source.get(source).copied().unwrap_or_default();
            SourceConversion {
                source: source.to_string(),
                total_leads,
                won_deals,
                total_revenue: round_to_cents(revenue),
                conversion_rate: round_to_cents(won_deals as f64 / total_leads as f64 * 100.0),
            }
        })
        .collect();

    let mut close_days: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
    for deal in closed_deals.iter().filter(|d| d.stage == DealStage::ClosedWon) {
        let (Some(close_date), Some(lead)) =
            (deal.close_date, deal.lead_id.and_then(|id| lead_by_id.get(&id)))
        else {
            continue;
        };
        let days = (close_date - lead.created_at.date_naive()).num_days();
        close_days.entry(lead.source.as_str()).or_default().push(days);
    }

    let avg_time_to_close = close_days
        .into_iter()
        .map(|(source, days)| SourceCloseTime {
            source: source.to_string(),
            avg_days_to_close: round_to_cents(days.iter().sum::<i64>() as f64 / days.len() as f64),
        })
        .collect();

    ConversionAnalytics {
        conversion_rates,
        avg_time_to_close,
    }
}

fn in_window<'a>(
    activities: &'a [Activity],
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> impl Iterator<Item = &'a Activity> {
    activities
        .iter()
        .filter(move |a| a.created_at >= since && a.created_at <= now)
}
