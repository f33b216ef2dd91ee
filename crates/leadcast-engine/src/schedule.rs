use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::{EngineConfig, PredictabilityService};

/// Builds the periodic forecast and rescoring jobs when the scheduler is
/// enabled. The caller starts the returned scheduler.
pub async fn maybe_build_scheduler(
    config: &EngineConfig,
    service: Arc<PredictabilityService>,
) -> Result<Option<JobScheduler>> {
    if !config.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;

    let forecast_service = service.clone();
    let forecast = Job::new_async(config.forecast_cron.as_str(), move |_uuid, _l| {
        let service = forecast_service.clone();
        Box::pin(async move {
            match service.generate_prediction().await {
                Ok(prediction) => info!(
                    prediction_date = %prediction.prediction_date,
                    predicted_amount = prediction.predicted_amount,
                    "scheduled forecast finished"
                ),
                Err(err) => error!(error = %err, "scheduled forecast failed"),
            }
        })
    })
    .with_context(|| format!("creating forecast job for cron {}", config.forecast_cron))?;
    sched.add(forecast).await.context("adding forecast job")?;

    let rescore = Job::new_async(config.rescore_cron.as_str(), move |_uuid, _l| {
        let service = service.clone();
        Box::pin(async move {
            match service.score_all_leads().await {
                Ok(outcomes) => info!(scored = outcomes.len(), "scheduled rescoring finished"),
                Err(err) => error!(error = %err, "scheduled rescoring failed"),
            }
        })
    })
    .with_context(|| format!("creating rescore job for cron {}", config.rescore_cron))?;
    sched.add(rescore).await.context("adding rescore job")?;

    Ok(Some(sched))
}
