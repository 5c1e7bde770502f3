//! Snapshot model and upsert engine
//!
//! A snapshot holds one [`Indicator`] per key, each with a bounded,
//! deduplicated, chronological series of values. [`SnapshotMerger`] applies
//! this run's candidate values on top of the previous snapshot.

use anyhow::{Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

/// One recorded value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub t: DateTime<Utc>,
    pub v: f64,
}

/// A tracked metric with display metadata and its value history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub source_url: String,
    /// Upstream as-of label (publication date, "Week of ..." text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<String>,
    #[serde(default)]
    pub series: Vec<SeriesPoint>,
}

impl Indicator {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            name: String::new(),
            unit: String::new(),
            format: String::new(),
            source_url: String::new(),
            as_of: None,
            series: Vec::new(),
        }
    }

    /// Most recent recorded value
    pub fn latest(&self) -> Option<f64> {
        self.series.last().map(|p| p.v)
    }
}

/// The document written at the end of every run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub items: Vec<Indicator>,
}

/// Only the items matter when reading a prior snapshot; older layouts
/// without an `items` array load as empty.
#[derive(Debug, Default, Deserialize)]
struct StoredSnapshot {
    #[serde(default)]
    items: Vec<Indicator>,
}

/// Current UTC time at second precision
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Parse the items of a snapshot document
pub fn parse_items(content: &str) -> Result<Vec<Indicator>> {
    let stored: StoredSnapshot = serde_json::from_str(content)
        .context("Failed to parse snapshot JSON")?;
    Ok(stored.items)
}

/// Items of the snapshot at `path`; a missing file is an empty snapshot
///
/// A file that exists but cannot be read or parsed is an error, so a run
/// never overwrites history it failed to load.
pub fn load_prior_items<P: AsRef<Path>>(path: P) -> Result<Vec<Indicator>> {
    let path = path.as_ref();
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No prior snapshot at {:?}, starting empty", path);
            return Ok(Vec::new());
        }
        Err(e) => return Err(e).context(format!("Failed to read snapshot file: {:?}", path)),
    };

    let items = parse_items(&content).context(format!("Prior snapshot {:?} is not a valid snapshot", path))?;
    info!("Loaded {} indicators from prior snapshot {:?}", items.len(), path);
    Ok(items)
}

/// A value proposed for one indicator in this run
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub key: String,
    pub name: String,
    pub unit: String,
    pub format: String,
    /// `None` when fetching or extraction failed
    pub value: Option<f64>,
    pub source_url: String,
    pub as_of: Option<String>,
}

/// What an upsert did to the series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new point was appended
    Appended,
    /// The value matched the last recorded one
    Unchanged,
    /// No value this run; history kept as-is
    NoValue,
}

/// Insert-or-update one indicator in `items`
///
/// Metadata always refreshes; `source_url` only when non-empty, `as_of`
/// only alongside a value.
/// The series gains a point only for a value that differs from the last one,
/// and is cut back to the newest `history_limit` points.
pub fn upsert(
    items: &mut BTreeMap<String, Indicator>,
    candidate: Candidate,
    now: DateTime<Utc>,
    history_limit: usize,
) -> UpsertOutcome {
    let Candidate { key, name, unit, format, value, source_url, as_of } = candidate;

    let indicator = items
        .entry(key.clone())
        .or_insert_with(|| Indicator::new(&key));

    indicator.name = name;
    indicator.unit = unit;
    indicator.format = format;
    if !source_url.trim().is_empty() {
        indicator.source_url = source_url;
    }

    let Some(value) = value else {
        return UpsertOutcome::NoValue;
    };

    if let Some(as_of) = as_of.filter(|a| !a.trim().is_empty()) {
        indicator.as_of = Some(as_of);
    }

    if indicator.latest() == Some(value) {
        return UpsertOutcome::Unchanged;
    }

    // Never step back in time, even if the host clock did
    let t = indicator.series.last().map_or(now, |last| last.t.max(now));
    indicator.series.push(SeriesPoint { t, v: value });

    if indicator.series.len() > history_limit {
        let excess = indicator.series.len() - history_limit;
        indicator.series.drain(..excess);
    }

    UpsertOutcome::Appended
}

/// Accumulates one run's upserts on top of the prior snapshot
pub struct SnapshotMerger {
    items: BTreeMap<String, Indicator>,
    history_limit: usize,
}

impl SnapshotMerger {
    /// Create a merger from the prior snapshot's items
    pub fn new(prior: Vec<Indicator>, history_limit: usize) -> Self {
        let history_limit = history_limit.max(1);
        let mut items = BTreeMap::new();
        for mut indicator in prior {
            if items.contains_key(&indicator.key) {
                warn!("Duplicate indicator {} in prior snapshot, keeping the later entry", indicator.key);
            }
            if indicator.series.len() > history_limit {
                let excess = indicator.series.len() - history_limit;
                info!("{}: dropping {} points over the history limit", indicator.key, excess);
                indicator.series.drain(..excess);
            }
            items.insert(indicator.key.clone(), indicator);
        }

        Self { items, history_limit }
    }

    pub fn upsert(&mut self, candidate: Candidate, now: DateTime<Utc>) -> UpsertOutcome {
        let key = candidate.key.clone();
        let outcome = upsert(&mut self.items, candidate, now, self.history_limit);
        debug!("Upsert {}: {:?}", key, outcome);
        outcome
    }

    pub fn get(&self, key: &str) -> Option<&Indicator> {
        self.items.get(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Final snapshot, items ordered by key
    pub fn finish(self, generated_at: DateTime<Utc>) -> Snapshot {
        Snapshot {
            generated_at,
            items: self.items.into_values().collect(),
        }
    }
}
