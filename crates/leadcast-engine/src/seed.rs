use std::path::Path;

use anyhow::{Context, Result};
use leadcast_core::{Lead, NewLead};
use serde::Deserialize;
use tokio::fs;

use crate::PredictabilityService;

#[derive(Debug, Deserialize)]
struct SampleLeadsFile {
    leads: Vec<NewLead>,
}

/// Reads a `leads:` list of demo leads from a YAML fixture.
pub async fn load_sample_leads(path: &Path) -> Result<Vec<NewLead>> {
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let file: SampleLeadsFile =
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(file.leads)
}

/// Loads the fixture and inserts the leads that are not on file yet, scoring
/// each new one.
pub async fn seed_sample_leads(service: &PredictabilityService, path: &Path) -> Result<Vec<Lead>> {
    let leads = load_sample_leads(path).await?;
    service
        .seed_leads(leads)
        .await
        .with_context(|| format!("seeding leads from {}", path.display()))
}
