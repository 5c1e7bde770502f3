//! One full refresh run
//!
//! Load the prior snapshot, read every configured indicator in order, fold
//! the readings (or manual overrides) into the snapshot, and write it back.
//! Only the final write can fail the run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Config, IndicatorConfig, SourceConfig};
use crate::http_client::{Fetch, FetchError, HttpClient};
use crate::manual::{ManualOverride, ManualOverrides};
use crate::snapshot::{load_prior_items, now_utc, Candidate, SnapshotMerger, UpsertOutcome};
use crate::sources::{Reading, SourceCollector};
use crate::writer::{JsonFileWriter, SnapshotWriter};

/// What a run did, per outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub output_path: PathBuf,
    /// Indicators that gained a new point
    pub appended: usize,
    /// Indicators whose value matched the last point
    pub unchanged: usize,
    /// Indicators with no value this run
    pub missing: usize,
}

/// Run against the real network and the configured output file
pub async fn run(config: &Config) -> Result<RunSummary> {
    let client = HttpClient::new(&config.user_agent, Duration::from_secs(config.timeout_secs))
        .context("Failed to create HTTP client")?;
    let writer = JsonFileWriter::new(config.output_path());
    run_with(config, &client, &writer, now_utc()).await
}

/// Run with explicit collaborators and clock
pub async fn run_with(
    config: &Config,
    fetcher: &dyn Fetch,
    writer: &dyn SnapshotWriter,
    now: DateTime<Utc>,
) -> Result<RunSummary> {
    let output_path = config.output_path();
    let prior = load_prior_items(&output_path)
        .context("Refusing to overwrite a prior snapshot that could not be loaded")?;
    let overrides = ManualOverrides::load(config.manual_path());

    let mut merger = SnapshotMerger::new(prior, config.history_limit);
    let mut collector = SourceCollector::new(fetcher, config, config.api_key());
    let mut summary = RunSummary { output_path: output_path.clone(), ..RunSummary::default() };

    for indicator in &config.indicators {
        let reading = match collector.read(indicator).await {
            Ok(reading) => reading,
            Err(e) => {
                let kind = e.downcast_ref::<FetchError>().map_or("source", FetchError::kind);
                warn!("{}: fetch failed [{}]: {:#}", indicator.key, kind, e);
                Reading::default()
            }
        };

        let candidate = build_candidate(indicator, reading, overrides.get(&indicator.key));
        let value = candidate.value;
        match merger.upsert(candidate, now) {
            UpsertOutcome::Appended => {
                info!("{}: recorded {}", indicator.key, value.unwrap_or_default());
                summary.appended += 1;
            }
            UpsertOutcome::Unchanged => {
                info!("{}: unchanged", indicator.key);
                summary.unchanged += 1;
            }
            UpsertOutcome::NoValue => {
                warn!("{}: no value this run, keeping prior history", indicator.key);
                summary.missing += 1;
            }
        }
    }

    let snapshot = merger.finish(now);
    writer
        .write_snapshot(&snapshot)
        .await
        .context(format!("Failed to write snapshot to {:?}", output_path))?;

    info!(
        "Wrote {} ({} appended, {} unchanged, {} without value)",
        output_path.display(),
        summary.appended,
        summary.unchanged,
        summary.missing
    );
    Ok(summary)
}

/// Combine a reading with the operator's override for the same key
///
/// Manual indicators always take the override. Auto indicators fall back to
/// it only when their own reading came back empty.
pub fn build_candidate(
    indicator: &IndicatorConfig,
    reading: Reading,
    manual: Option<&ManualOverride>,
) -> Candidate {
    let mut candidate = Candidate {
        key: indicator.key.clone(),
        name: indicator.name.clone(),
        unit: indicator.unit.clone(),
        format: indicator.format.clone(),
        value: reading.value,
        source_url: reading.source_url,
        as_of: reading.as_of,
    };

    let Some(manual) = manual else {
        return candidate;
    };

    let is_manual = matches!(indicator.source, SourceConfig::Manual);
    let use_override = is_manual || (candidate.value.is_none() && manual.value.is_some());
    if use_override {
        if !is_manual {
            info!("{}: using manual override", indicator.key);
        }
        candidate.value = manual.value;
        if let Some(unit) = &manual.unit {
            candidate.unit = unit.clone();
        }
        candidate.source_url = manual.source.clone().unwrap_or_default();
        candidate.as_of = manual.as_of.clone();
    }

    candidate
}
