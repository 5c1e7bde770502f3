//! Market Pulse Library
//!
//! This library refreshes a handful of market indicators (an FX rate and
//! shipping-cost indices) from public sources and a manual override file,
//! and merges them into a JSON snapshot with a bounded history per indicator.
//!
//! Pipeline:
//! - Fetch: HttpClient (behind the Fetch trait)
//! - Extract: JSON fields, freight page lanes, search-result symbols
//! - Merge: SnapshotMerger
//! - Write: JsonFileWriter

pub mod config;
pub mod http_client;
pub mod extract;
pub mod manual;
pub mod snapshot;
pub mod sources;
pub mod writer;
pub mod runner;

// Re-export commonly used types
pub use config::{Config, IndicatorConfig, MarketDataConfig, SourceConfig};
pub use http_client::{Fetch, FetchError, HttpClient};
pub use manual::{ManualOverride, ManualOverrides};
pub use snapshot::{Candidate, Indicator, SeriesPoint, Snapshot, SnapshotMerger, UpsertOutcome};
pub use sources::{Reading, SourceCollector};
pub use writer::{JsonFileWriter, SnapshotWriter};
pub use runner::{run, run_with, RunSummary};
