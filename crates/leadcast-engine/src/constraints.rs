//! Rule-based detection of sales-process bottlenecks over recent activity and
//! deal data.

use chrono::Duration;
use leadcast_core::{
    Activity, ActivityStatus, ActivityType, ConstraintImpact, ConstraintStatus, Deal, DealStage,
    NewSalesConstraint,
};

pub const ACTIVITY_WINDOW_DAYS: i64 = 30;
pub const DEAL_WINDOW_DAYS: i64 = 90;

pub const LOW_EMAIL_OPEN_RATE: &str = "Low email open rate";
pub const DEMO_DROP_OFF: &str = "High drop-off after demo";
pub const SLOW_FOLLOW_UP: &str = "Slow follow-up time";

const MIN_EMAILS: usize = 10;
const MIN_EMAIL_OPEN_RATE: f64 = 20.0;
const MIN_DEMOS: usize = 5;
const MIN_DEMO_CONVERSION: f64 = 30.0;
const MIN_FOLLOW_UP_SAMPLES: usize = 5;
const MAX_FOLLOW_UP_HOURS: f64 = 48.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedConstraint {
    pub issue: &'static str,
    pub impact: ConstraintImpact,
    pub recommendation: &'static str,
}

impl DetectedConstraint {
    pub fn into_new(self) -> NewSalesConstraint {
        NewSalesConstraint {
            issue: self.issue.to_string(),
            impact: self.impact,
            status: ConstraintStatus::Active,
            recommendation: Some(self.recommendation.to_string()),
        }
    }
}

pub fn analyze_sales_constraints(activities: &[Activity], deals: &[Deal]) -> Vec<DetectedConstraint> {
    let mut found = Vec::new();

    let emails = activities
        .iter()
        .filter(|a| a.kind == ActivityType::Email)
        .collect::<Vec<_>>();
    let opened = emails
        .iter()
        .filter(|a| a.status == ActivityStatus::Completed)
        .count();
    if emails.len() > MIN_EMAILS && percent(opened, emails.len()) < MIN_EMAIL_OPEN_RATE {
        found.push(DetectedConstraint {
            issue: LOW_EMAIL_OPEN_RATE,
            impact: ConstraintImpact::High,
            recommendation: "Revise email subject lines and test variations",
        });
    }

    let shown = deals.iter().filter(|d| d.stage == DealStage::Shown).count();
    let won = deals.iter().filter(|d| d.stage == DealStage::ClosedWon).count();
    if shown > MIN_DEMOS && percent(won, shown) < MIN_DEMO_CONVERSION {
        found.push(DetectedConstraint {
            issue: DEMO_DROP_OFF,
            impact: ConstraintImpact::High,
            recommendation: "Review demo script and add more value propositions",
        });
    }

    let gaps = follow_up_gaps(activities);
    if gaps.len() > MIN_FOLLOW_UP_SAMPLES {
        let average = gaps.iter().sum::<f64>() / gaps.len() as f64;
        if average > MAX_FOLLOW_UP_HOURS {
            found.push(DetectedConstraint {
                issue: SLOW_FOLLOW_UP,
                impact: ConstraintImpact::Medium,
                recommendation: "Implement automated initial response system",
            });
        }
    }

    found
}

/// Hours from each completed call to the earliest later activity of the same
/// lead. Calls with no lead or no later activity yield no sample.
pub fn follow_up_gaps(activities: &[Activity]) -> Vec<f64> {
    activities
        .iter()
        .filter(|a| a.kind == ActivityType::Call && a.status == ActivityStatus::Completed)
        .filter_map(|call| {
            let lead_id = call.lead_id?;
            let next = activities
                .iter()
                .filter(|a| a.lead_id == Some(lead_id) && a.created_at > call.created_at)
                .map(|a| a.created_at)
                .min()?;
            Some(hours(next - call.created_at))
        })
        .collect()
}

fn hours(gap: Duration) -> f64 {
    gap.num_seconds() as f64 / 3600.0
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).single().unwrap()
    }

    fn activity(kind: ActivityType, status: ActivityStatus, lead_id: Option<Uuid>, at_hours: i64) -> Activity {
        Activity {
            id: Uuid::new_v4(),
            lead_id,
            kind,
            status,
            duration: None,
            created_at: t0() + Duration::hours(at_hours),
        }
    }

    fn deal(stage: DealStage) -> Deal {
        Deal {
            id: Uuid::new_v4(),
            lead_id: None,
            stage,
            amount: 1000.0,
            close_date: None,
            created_at: t0(),
        }
    }

    fn emails(total: usize, opened: usize) -> Vec<Activity> {
        (0..total)
            .map(|i| {
                let status = if i < opened {
                    ActivityStatus::Completed
                } else {
                    ActivityStatus::Scheduled
                };
                activity(ActivityType::Email, status, None, i as i64)
            })
            .collect()
    }

    fn issues(found: &[DetectedConstraint]) -> Vec<&'static str> {
        found.iter().map(|c| c.issue).collect()
    }

    #[test]
    fn nothing_flagged_without_data() {
        assert!(analyze_sales_constraints(&[], &[]).is_empty());
    }

    #[test]
    fn low_email_open_rate_needs_more_than_ten_emails() {
        assert!(analyze_sales_constraints(&emails(10, 0), &[]).is_empty());
        let found = analyze_sales_constraints(&emails(11, 2), &[]);
        assert_eq!(issues(&found), [LOW_EMAIL_OPEN_RATE]);
        assert_eq!(found[0].impact, ConstraintImpact::High);
        // 3 of 11 is above 20%.
        assert!(analyze_sales_constraints(&emails(11, 3), &[]).is_empty());
    }

    #[test]
    fn demo_drop_off() {
        let mut deals = (0..6).map(|_| deal(DealStage::Shown)).collect::<Vec<_>>();
        deals.push(deal(DealStage::ClosedWon));
        assert_eq!(issues(&analyze_sales_constraints(&[], &deals)), [DEMO_DROP_OFF]);

        deals.push(deal(DealStage::ClosedWon));
        // 2 of 6 is above 30%.
        assert!(analyze_sales_constraints(&[], &deals).is_empty());

        let five_shown = (0..5).map(|_| deal(DealStage::Shown)).collect::<Vec<_>>();
        assert!(analyze_sales_constraints(&[], &five_shown).is_empty());
    }

    #[test]
    fn follow_up_uses_earliest_later_activity_of_same_lead() {
        let lead = Some(Uuid::new_v4());
        let other = Some(Uuid::new_v4());
        let activities = vec![
            activity(ActivityType::Call, ActivityStatus::Completed, lead, 0),
            activity(ActivityType::Email, ActivityStatus::Completed, lead, 90),
            activity(ActivityType::Text, ActivityStatus::Completed, lead, 30),
            activity(ActivityType::Email, ActivityStatus::Completed, other, 1),
            activity(ActivityType::Call, ActivityStatus::Completed, None, 0),
            activity(ActivityType::Call, ActivityStatus::Scheduled, lead, 5),
        ];
        assert_eq!(follow_up_gaps(&activities), vec![30.0]);
    }

    #[test]
    fn slow_follow_up_needs_more_than_five_samples() {
        let build = |samples: usize, gap: i64| {
            (0..samples)
                .flat_map(|_| {
                    let lead = Some(Uuid::new_v4());
                    [
                        activity(ActivityType::Call, ActivityStatus::Completed, lead, 0),
                        activity(ActivityType::Email, ActivityStatus::Completed, lead, gap),
                    ]
                })
                .collect::<Vec<_>>()
        };

        let found = analyze_sales_constraints(&build(6, 49), &[]);
        assert_eq!(issues(&found), [SLOW_FOLLOW_UP]);
        assert_eq!(found[0].impact, ConstraintImpact::Medium);

        assert!(analyze_sales_constraints(&build(5, 72), &[]).is_empty());
        assert!(analyze_sales_constraints(&build(6, 48), &[]).is_empty());
    }

    #[test]
    fn detected_constraints_start_active() {
        let new = DetectedConstraint {
            issue: SLOW_FOLLOW_UP,
            impact: ConstraintImpact::Medium,
            recommendation: "Implement automated initial response system",
        }
        .into_new();
        assert_eq!(new.status, ConstraintStatus::Active);
        assert_eq!(new.issue, SLOW_FOLLOW_UP);
    }
}
