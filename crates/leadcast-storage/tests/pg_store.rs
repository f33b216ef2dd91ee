// Round-trips against a real Postgres. Skipped unless LEADCAST_TEST_DATABASE_URL is set.

use chrono::{NaiveDate, Utc};
use leadcast_core::{
    ConstraintImpact, ConstraintStatus, LeadStatus, NewLead, NewSalesConstraint, PredictionFactors,
    RevenuePrediction, SalesConstraintUpdate, ScoreFactors,
};
use leadcast_storage::{ConstraintStore, DealStore, LeadStore, PgStore};
use uuid::Uuid;

async fn store() -> Option<PgStore> {
    let url = std::env::var("LEADCAST_TEST_DATABASE_URL").ok()?;
    let store = PgStore::connect(&url, 2).await.expect("connect");
    store.migrate().await.expect("migrate");
    Some(store)
}

#[tokio::test]
async fn score_history_round_trip() {
    let Some(store) = store().await else { return };
    let email = format!("{}@example.com", Uuid::new_v4());
    let (lead, created) = store
        .find_or_create_lead(NewLead {
            source: "Referral".into(),
            status: LeadStatus::Qualified,
            first_name: Some("Ana".into()),
            last_name: Some("Ruiz".into()),
            email: Some(email.clone()),
            phone: None,
            company: Some("Ruiz Ltd".into()),
            job_title: None,
            notes: None,
        })
        .await
        .expect("insert lead");
    assert!(created);

    let factors = ScoreFactors {
        source: 25,
        engagement: 0,
        recency: 0,
        completeness: 16,
    };
    let scored = store
        .record_lead_score(lead.id, factors, Utc::now())
        .await
        .expect("score write")
        .expect("lead exists");
    assert_eq!(scored.lead.ai_score, Some(41));

    let history = store.score_history(lead.id).await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].factors, factors);
    assert_eq!(history[0].factors.total(), scored.lead.ai_score.unwrap());

    assert!(store
        .record_lead_score(Uuid::new_v4(), factors, Utc::now())
        .await
        .expect("score write")
        .is_none());
}

#[tokio::test]
async fn prediction_and_constraint_round_trip() {
    let Some(store) = store().await else { return };
    let prediction = RevenuePrediction {
        id: Uuid::new_v4(),
        prediction_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
        predicted_amount: 1140.0,
        confidence_low: 969.0,
        confidence_high: 1311.0,
        factors: PredictionFactors {
            historical_average: 1000.0,
            pipeline_value: 1200.0,
            pipeline_deals: 1,
            historical_deals: 2,
            skipped_deals: 0,
        },
        created_at: Utc::now(),
    };
    store.insert_revenue_prediction(&prediction).await.expect("insert prediction");
    let listed = store.list_revenue_predictions().await.expect("list predictions");
    let stored = listed.iter().find(|p| p.id == prediction.id).expect("stored");
    assert_eq!(stored.predicted_amount, 1140.0);
    assert_eq!(stored.factors, prediction.factors);

    let issue = format!("issue-{}", Uuid::new_v4());
    let constraint = NewSalesConstraint {
        issue: issue.clone(),
        impact: ConstraintImpact::Medium,
        status: ConstraintStatus::Active,
        recommendation: Some("look closer".into()),
    }
    .into_constraint(Utc::now());
    store.insert_constraint(&constraint).await.expect("insert constraint");
    assert!(store.find_unresolved_constraint(&issue).await.expect("find").is_some());

    let updated = store
        .update_constraint(
            constraint.id,
            &SalesConstraintUpdate {
                status: ConstraintStatus::Resolved,
                recommendation: None,
                resolution: Some("fixed cadence".into()),
            },
            Utc::now(),
        )
        .await
        .expect("update")
        .expect("exists");
    assert_eq!(updated.status, ConstraintStatus::Resolved);
    assert_eq!(updated.recommendation.as_deref(), Some("look closer"));
    assert_eq!(updated.resolution.as_deref(), Some("fixed cadence"));
    assert!(store.find_unresolved_constraint(&issue).await.expect("find").is_none());
}

#[tokio::test]
async fn failed_history_insert_leaves_score_untouched() {
    let Some(store) = store().await else { return };
    let (lead, _) = store
        .find_or_create_lead(NewLead {
            source: "Website".into(),
            status: LeadStatus::New,
            first_name: Some("Tomas".into()),
            last_name: None,
            email: Some(format!("{}@example.com", Uuid::new_v4())),
            phone: None,
            company: None,
            job_title: None,
            notes: None,
        })
        .await
        .expect("insert lead");
    let first = ScoreFactors {
        source: 10,
        engagement: 0,
        recency: 0,
        completeness: 8,
    };
    store
        .record_lead_score(lead.id, first, Utc::now())
        .await
        .expect("score write")
        .expect("lead exists");

    // Reject history rows for this lead only so concurrent tests are unaffected.
    let suffix = lead.id.simple().to_string();
    let function = format!("reject_history_{suffix}");
    let trigger = format!("reject_history_{suffix}_trg");
    sqlx::raw_sql(&format!(
        "CREATE FUNCTION {function}() RETURNS trigger AS $$ \
         BEGIN \
           IF NEW.lead_id = '{id}' THEN RAISE EXCEPTION 'history write rejected'; END IF; \
           RETURN NEW; \
         END $$ LANGUAGE plpgsql; \
         CREATE TRIGGER {trigger} BEFORE INSERT ON lead_scores_history \
           FOR EACH ROW EXECUTE FUNCTION {function}();",
        id = lead.id
    ))
    .execute(store.pool())
    .await
    .expect("install trigger");

    let second = ScoreFactors {
        source: 10,
        engagement: 30,
        recency: 20,
        completeness: 8,
    };
    let result = store.record_lead_score(lead.id, second, Utc::now()).await;

    sqlx::raw_sql(&format!(
        "DROP TRIGGER {trigger} ON lead_scores_history; DROP FUNCTION {function}();"
    ))
    .execute(store.pool())
    .await
    .expect("drop trigger");

    assert!(result.is_err());
    let reloaded = store.fetch_lead(lead.id).await.expect("fetch").expect("lead exists");
    assert_eq!(reloaded.ai_score, Some(first.total()));
    let history = store.score_history(lead.id).await.expect("history");
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn prediction_amounts_beyond_ten_billion_round_trip() {
    let Some(store) = store().await else { return };
    let prediction = RevenuePrediction {
        id: Uuid::new_v4(),
        prediction_date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
        predicted_amount: 50_000_000_000.0,
        confidence_low: 42_500_000_000.0,
        confidence_high: 57_500_000_000.0,
        factors: PredictionFactors {
            historical_average: 40_000_000_000.0,
            pipeline_value: 60_000_000_000.0,
            pipeline_deals: 3,
            historical_deals: 5,
            skipped_deals: 0,
        },
        created_at: Utc::now(),
    };
    store.insert_revenue_prediction(&prediction).await.expect("insert prediction");
    let listed = store.list_revenue_predictions().await.expect("list predictions");
    let stored = listed.iter().find(|p| p.id == prediction.id).expect("stored");
    assert_eq!(stored.predicted_amount, 50_000_000_000.0);
    assert_eq!(stored.confidence_high, 57_500_000_000.0);
}
