//! Axum JSON API for lead scoring, revenue prediction, sales constraints and
//! pipeline analytics.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use leadcast_core::{ConstraintImpact, ConstraintStatus, NewSalesConstraint, SalesConstraintUpdate};
use leadcast_engine::{
    maybe_build_scheduler, EngineConfig, EngineError, PredictabilityService,
    CONVERSION_WINDOW_DAYS, ENGAGEMENT_WINDOW_DAYS,
};
use leadcast_storage::PgStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

pub const CRATE_NAME: &str = "leadcast-web";
pub const API_PREFIX: &str = "/api/lead-predictability";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictabilityService>,
}

impl AppState {
    pub fn new(service: Arc<PredictabilityService>) -> Self {
        Self { service }
    }
}

/// Body of `POST /constraints` and `PUT /constraints/{id}`. Fields are kept
/// as text so that every invalid field can be reported at once.
#[derive(Debug, Default, Deserialize)]
struct ConstraintBody {
    #[serde(default)]
    issue: Option<String>,
    #[serde(default)]
    impact: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    recommendation: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
}

#[derive(Debug, Serialize)]
struct FieldError {
    param: &'static str,
    msg: String,
}

impl ConstraintBody {
    fn into_new(self) -> Result<NewSalesConstraint, Vec<FieldError>> {
        let mut errors = Vec::new();
        let issue = self.issue.filter(|issue| !issue.trim().is_empty());
        if issue.is_none() {
            errors.push(FieldError {
                param: "issue",
                msg: "Issue is required".to_string(),
            });
        }
        let impact = parse_field::<ConstraintImpact>(self.impact, "impact", "Impact is required", &mut errors);
        let status = parse_field::<ConstraintStatus>(self.status, "status", "Status is required", &mut errors);

        match (issue, impact, status) {
            (Some(issue), Some(impact), Some(status)) => Ok(NewSalesConstraint {
                issue,
                impact,
                status,
                recommendation: self.recommendation,
            }),
            _ => Err(errors),
        }
    }

    fn into_update(self) -> Result<SalesConstraintUpdate, Vec<FieldError>> {
        let mut errors = Vec::new();
        match parse_field::<ConstraintStatus>(self.status, "status", "Status is required", &mut errors) {
            Some(status) => Ok(SalesConstraintUpdate {
                status,
                recommendation: self.recommendation,
                resolution: self.resolution,
            }),
            None => Err(errors),
        }
    }
}

/// Query string of the analytics endpoints.
#[derive(Debug, Default, Deserialize)]
struct AnalyticsQuery {
    #[serde(default)]
    days: Option<i64>,
}

fn analytics_days(
    query: Result<Query<AnalyticsQuery>, QueryRejection>,
    default_days: i64,
) -> Result<i64, Vec<FieldError>> {
    let days_error = |msg: String| vec![FieldError { param: "days", msg }];
    let Query(query) = query.map_err(|rejection| days_error(rejection.body_text()))?;
    match query.days.unwrap_or(default_days) {
        days if days > 0 => Ok(days),
        _ => Err(days_error("Days must be a positive integer".to_string())),
    }
}

fn parse_field<T: FromStr>(
    raw: Option<String>,
    param: &'static str,
    msg: &str,
    errors: &mut Vec<FieldError>,
) -> Option<T> {
    let parsed = raw.as_deref().and_then(|value| value.parse().ok());
    if parsed.is_none() {
        errors.push(FieldError {
            param,
            msg: msg.to_string(),
        });
    }
    parsed
}

pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route("/scores", get(list_scores_handler))
        .route("/scores/{lead_id}", get(score_history_handler).post(score_lead_handler))
        .route(
            "/predictions/revenue",
            get(list_predictions_handler).post(generate_prediction_handler),
        )
        .route("/constraints", get(list_constraints_handler).post(add_constraint_handler))
        .route("/constraints/analyze", post(analyze_constraints_handler))
        .route("/constraints/{id}", put(update_constraint_handler))
        .route("/analytics/engagement", get(engagement_analytics_handler))
        .route("/analytics/conversion", get(conversion_analytics_handler))
        .route("/health", get(health_handler));

    Router::new()
        .nest(API_PREFIX, api)
        .with_state(Arc::new(state))
}

/// Connects to Postgres, starts the scheduler when enabled and serves the API
/// on `LEADCAST_WEB_PORT`.
pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = EngineConfig::from_env();
    let port: u16 = std::env::var("LEADCAST_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);

    let store = PgStore::connect(&config.database_url, config.db_max_connections)
        .await
        .context("connecting to database")?;
    let service = Arc::new(PredictabilityService::new(Arc::new(store)));

    let scheduler = maybe_build_scheduler(&config, service.clone()).await?;
    if let Some(sched) = &scheduler {
        sched.start().await.context("starting scheduler")?;
        info!(
            forecast_cron = %config.forecast_cron,
            rescore_cron = %config.rescore_cron,
            "scheduler started"
        );
    }

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!(port, prefix = API_PREFIX, "serving api");
    axum::serve(listener, app(AppState::new(service))).await?;
    Ok(())
}

async fn list_scores_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.service.list_lead_scores().await {
        Ok(leads) => Json(leads).into_response(),
        Err(err) => engine_error(err),
    }
}

async fn score_history_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<Uuid>,
) -> Response {
    match state.service.score_history(lead_id).await {
        Ok(history) => Json(history).into_response(),
        Err(err) => engine_error(err),
    }
}

async fn score_lead_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<Uuid>,
) -> Response {
    match state.service.score_lead(lead_id).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err) => engine_error(err),
    }
}

async fn list_predictions_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.service.list_predictions().await {
        Ok(predictions) => Json(predictions).into_response(),
        Err(err) => engine_error(err),
    }
}

async fn generate_prediction_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.service.generate_prediction().await {
        Ok(prediction) => Json(prediction).into_response(),
        Err(err) => engine_error(err),
    }
}

async fn list_constraints_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.service.list_constraints().await {
        Ok(constraints) => Json(constraints).into_response(),
        Err(err) => engine_error(err),
    }
}

async fn add_constraint_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ConstraintBody>, JsonRejection>,
) -> Response {
    let new = match payload.map_err(rejected_body).and_then(|Json(body)| body.into_new()) {
        Ok(new) => new,
        Err(errors) => return bad_request(errors),
    };
    match state.service.add_constraint(new).await {
        Ok(constraint) => Json(constraint).into_response(),
        Err(err) => engine_error(err),
    }
}

async fn update_constraint_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<ConstraintBody>, JsonRejection>,
) -> Response {
    let update = match payload.map_err(rejected_body).and_then(|Json(body)| body.into_update()) {
        Ok(update) => update,
        Err(errors) => return bad_request(errors),
    };
    match state.service.update_constraint(id, update).await {
        Ok(constraint) => Json(constraint).into_response(),
        Err(err) => engine_error(err),
    }
}

async fn analyze_constraints_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.service.analyze_constraints().await {
        Ok(constraints) => Json(constraints).into_response(),
        Err(err) => engine_error(err),
    }
}

async fn engagement_analytics_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AnalyticsQuery>, QueryRejection>,
) -> Response {
    let days = match analytics_days(query, ENGAGEMENT_WINDOW_DAYS) {
        Ok(days) => days,
        Err(errors) => return bad_request(errors),
    };
    match state.service.engagement_analytics(days).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => engine_error(err),
    }
}

async fn conversion_analytics_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AnalyticsQuery>, QueryRejection>,
) -> Response {
    let days = match analytics_days(query, CONVERSION_WINDOW_DAYS) {
        Ok(days) => days,
        Err(errors) => return bad_request(errors),
    };
    match state.service.conversion_analytics(days).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => engine_error(err),
    }
}

async fn health_handler() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

fn rejected_body(rejection: JsonRejection) -> Vec<FieldError> {
    vec![FieldError {
        param: "body",
        msg: rejection.body_text(),
    }]
}

fn bad_request(errors: Vec<FieldError>) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
}

fn engine_error(err: EngineError) -> Response {
    match err {
        EngineError::NotFound { entity, .. } => {
            let msg = match entity {
                "constraint" => "Constraint not found",
                _ => "Lead not found",
            };
            (StatusCode::NOT_FOUND, Json(json!({ "msg": msg }))).into_response()
        }
        EngineError::InvalidInput(msg) => bad_request(vec![FieldError { param: "body", msg }]),
        EngineError::Store(err) => {
            error!(error = %err, "storage failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "msg": "Server Error" })),
            )
                .into_response()
        }
    }
}
