//! Four-factor lead scoring. Each factor is capped at 25, so the total is
//! always within 0..=100.

use chrono::{DateTime, Utc};
use leadcast_core::{Activity, Lead, LeadSource, ScoreFactors};
use serde::Serialize;

pub const FACTOR_CAP: i32 = 25;
const POINTS_PER_ACTIVITY: i32 = 5;
const PROFILE_FIELD_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeadScore {
    pub score: i32,
    pub factors: ScoreFactors,
}

pub fn compute_lead_score(lead: &Lead, activities: &[Activity], now: DateTime<Utc>) -> LeadScore {
    let latest = activities.iter().map(|a| a.created_at).max();
    let factors = ScoreFactors {
        source: source_score(lead.source_channel()),
        engagement: engagement_score(activities.len()),
        recency: recency_score(latest, now),
        completeness: completeness_score(lead.filled_profile_fields()),
    };
    LeadScore {
        score: factors.total(),
        factors,
    }
}

pub fn source_score(source: LeadSource) -> i32 {
    match source {
        LeadSource::Referral => 25,
        LeadSource::Website => 20,
        LeadSource::Linkedin => 18,
        LeadSource::Facebook | LeadSource::Google => 15,
        LeadSource::ColdCall => 10,
        LeadSource::Other => 5,
    }
}

pub fn engagement_score(activity_count: usize) -> i32 {
    let capped = activity_count.min((FACTOR_CAP / POINTS_PER_ACTIVITY) as usize) as i32;
    capped * POINTS_PER_ACTIVITY
}

/// Maps whole days since the latest activity onto fixed breakpoints. An
/// activity stamped in the future counts as "today".
pub fn recency_score(latest_activity: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i32 {
    let Some(latest) = latest_activity else {
        return 0;
    };
    match (now - latest).num_days() {
        d if d < 1 => 25,
        d if d < 3 => 20,
        d if d < 7 => 15,
        d if d < 14 => 10,
        d if d < 30 => 5,
        _ => 0,
    }
}

/// `floor(filled / 6 * 25)`, computed in integers.
pub fn completeness_score(filled_fields: usize) -> i32 {
    let filled = filled_fields.min(PROFILE_FIELD_COUNT);
    (filled * FACTOR_CAP as usize / PROFILE_FIELD_COUNT) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use leadcast_core::{ActivityStatus, ActivityType, LeadStatus, NewLead};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).single().unwrap()
    }

    fn lead(source: &str, filled: usize) -> Lead {
        let values = [
            "Michael",
            "Brown",
            "michael.brown@example.com",
            "555-345-6789",
            "Global Services",
            "Sales Manager",
        ];
        let field = |i: usize| (i < filled).then(|| values[i].to_string());
        NewLead {
            source: source.into(),
            status: LeadStatus::Qualified,
            first_name: field(0),
            last_name: field(1),
            email: field(2),
            phone: field(3),
            company: field(4),
            job_title: field(5),
            notes: None,
        }
        .into_lead(now())
    }

    fn activity_ago(age: Duration) -> Activity {
        Activity {
            id: Uuid::new_v4(),
            lead_id: None,
            kind: ActivityType::Call,
            status: ActivityStatus::Completed,
            duration: Some(300),
            created_at: now() - age,
        }
    }

    #[test]
    fn referral_example_scores_85() {
        let activities = vec![
            activity_ago(Duration::days(9)),
            activity_ago(Duration::days(2)),
            activity_ago(Duration::days(5)),
        ];
        let out = compute_lead_score(&lead("referral", 6), &activities, now());
        assert_eq!(
            out.factors,
            ScoreFactors {
                source: 25,
                engagement: 15,
                recency: 20,
                completeness: 25,
            }
        );
        assert_eq!(out.score, 85);
    }

    #[test]
    fn unknown_and_mixed_case_sources() {
        assert_eq!(compute_lead_score(&lead("Trade Show", 0), &[], now()).factors.source, 5);
        assert_eq!(compute_lead_score(&lead("WEBSITE", 0), &[], now()).factors.source, 20);
        assert_eq!(compute_lead_score(&lead("LinkedIn", 0), &[], now()).factors.source, 18);
        // The separator matters: only the exact channel key folds.
        assert_eq!(compute_lead_score(&lead("Cold Call", 0), &[], now()).factors.source, 5);
    }

    #[test]
    fn no_activities_means_no_engagement_or_recency() {
        let out = compute_lead_score(&lead("google", 0), &[], now());
        assert_eq!(out.factors.engagement, 0);
        assert_eq!(out.factors.recency, 0);
        assert_eq!(out.score, 15);
    }

    #[test]
    fn engagement_caps_at_five_activities() {
        assert_eq!(engagement_score(0), 0);
        assert_eq!(engagement_score(4), 20);
        assert_eq!(engagement_score(5), 25);
        assert_eq!(engagement_score(12), 25);
    }

    #[test]
    fn recency_breakpoints_are_strict() {
        let at = |hours: i64| recency_score(Some(now() - Duration::hours(hours)), now());
        assert_eq!(at(0), 25);
        assert_eq!(at(23), 25);
        assert_eq!(at(24), 20);
        assert_eq!(at(3 * 24 - 1), 20);
        assert_eq!(at(3 * 24), 15);
        assert_eq!(at(7 * 24), 10);
        assert_eq!(at(14 * 24), 5);
        assert_eq!(at(29 * 24), 5);
        assert_eq!(at(30 * 24), 0);
        assert_eq!(at(400 * 24), 0);
        assert_eq!(at(-5), 25);
        assert_eq!(recency_score(None, now()), 0);
    }

    #[test]
    fn recency_uses_latest_activity_regardless_of_order() {
        let activities = vec![
            activity_ago(Duration::days(40)),
            activity_ago(Duration::hours(2)),
            activity_ago(Duration::days(10)),
        ];
        let out = compute_lead_score(&lead("other", 0), &activities, now());
        assert_eq!(out.factors.recency, 25);
    }

    #[test]
    fn completeness_floors() {
        let expected = [0, 4, 8, 12, 16, 20, 25];
        for (filled, want) in expected.into_iter().enumerate() {
            assert_eq!(completeness_score(filled), want, "filled={filled}");
            assert_eq!(
                compute_lead_score(&lead("other", filled), &[], now()).factors.completeness,
                want
            );
        }
    }

    #[test]
    fn score_stays_in_range_and_matches_factor_sum() {
        for source in ["referral", "website", "facebook", "nope"] {
            for filled in 0..=6 {
                for count in 0..8 {
                    let activities: Vec<_> = (0..count)
                        .map(|i| activity_ago(Duration::days(i * 4)))
                        .collect();
                    let out = compute_lead_score(&lead(source, filled), &activities, now());
                    assert!((0..=100).contains(&out.score));
                    assert_eq!(out.score, out.factors.total());
                }
            }
        }
    }

    #[test]
    fn identical_inputs_give_identical_scores() {
        let activities = vec![activity_ago(Duration::days(1))];
        let l = lead("facebook", 4);
        assert_eq!(
            compute_lead_score(&l, &activities, now()),
            compute_lead_score(&l, &activities, now())
        );
    }
}
