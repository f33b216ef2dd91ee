use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use leadcast_engine::{
    seed_sample_leads, EngineConfig, PredictabilityService, CONVERSION_WINDOW_DAYS,
    ENGAGEMENT_WINDOW_DAYS,
};
use leadcast_storage::PgStore;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "leadcast-cli")]
#[command(about = "Lead scoring and revenue prediction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply database migrations.
    Migrate,
    /// Serve the JSON API (and the scheduler when enabled).
    Serve,
    /// Score one lead and print the result.
    Score { lead_id: Uuid },
    /// Rescore every lead.
    ScoreAll,
    /// Generate and store next month's revenue prediction.
    Predict,
    /// Run constraint analysis and print all constraints.
    Constraints,
    /// Print activity counts and the most engaged leads.
    Engagement {
        #[arg(long, default_value_t = ENGAGEMENT_WINDOW_DAYS)]
        days: i64,
    },
    /// Print conversion rates and time to close by lead source.
    Conversion {
        #[arg(long, default_value_t = CONVERSION_WINDOW_DAYS)]
        days: i64,
    },
    /// Insert the sample leads that are not present yet.
    Seed {
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    match cli.command {
        Commands::Migrate => {
            let store = connect(&config).await?;
            store.migrate().await.context("running migrations")?;
            println!("migrations applied");
        }
        Commands::Serve => {
            leadcast_web::serve_from_env().await?;
        }
        Commands::Score { lead_id } => {
            let outcome = service(&config).await?.score_lead(lead_id).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::ScoreAll => {
            let outcomes = service(&config).await?.score_all_leads().await?;
            println!("rescored {} leads", outcomes.len());
        }
        Commands::Predict => {
            let prediction = service(&config).await?.generate_prediction().await?;
            println!(
                "prediction for {}: {:.2} (range {:.2}..{:.2}, skipped deals {})",
                prediction.prediction_date,
                prediction.predicted_amount,
                prediction.confidence_low,
                prediction.confidence_high,
                prediction.factors.skipped_deals
            );
        }
        Commands::Constraints => {
            let constraints = service(&config).await?.analyze_constraints().await?;
            println!("{}", serde_json::to_string_pretty(&constraints)?);
        }
        Commands::Engagement { days } => {
            let report = service(&config).await?.engagement_analytics(days).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Conversion { days } => {
            let report = service(&config).await?.conversion_analytics(days).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Seed { fixture } => {
            let path = fixture.unwrap_or_else(|| config.sample_leads_path.clone());
            let service = service(&config).await?;
            let created = seed_sample_leads(&service, &path).await?;
            info!(path = %path.display(), created = created.len(), "seed finished");
            println!("seeded {} new leads from {}", created.len(), path.display());
        }
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_env("LEADCAST_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

async fn connect(config: &EngineConfig) -> Result<PgStore> {
    PgStore::connect(&config.database_url, config.db_max_connections)
        .await
        .context("connecting to database")
}

async fn service(config: &EngineConfig) -> Result<PredictabilityService> {
    let store = connect(config).await?;
    Ok(PredictabilityService::new(Arc::new(store)))
}
