//! Manual override store
//!
//! Operators keep values that cannot be fetched reliably in a small JSON file.
//! Two layouts are accepted:
//!
//! ```json
//! { "wci": { "value": 1850, "unit": "USD/40ft", "source": "drewry.co.uk", "as_of": "2024-11-21" } }
//! ```
//!
//! ```json
//! { "as_of": "2024-11-21", "series": { "wci": { "value": "1,850" } } }
//! ```
//!
//! A missing or unreadable file is an empty override set, never an error.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::extract::parse_number;

/// Operator-supplied record for one indicator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualOverride {
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub source: Option<String>,
    pub as_of: Option<String>,
}

/// All overrides keyed by indicator key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualOverrides {
    entries: BTreeMap<String, ManualOverride>,
}

impl ManualOverrides {
    /// Read the override document; absent or unreadable means no overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No manual override file at {:?}", path);
            return Self::default();
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read manual override file {:?} ({}), ignoring it", path, e);
                return Self::default();
            }
        };

        match Self::from_json_str(&content) {
            Some(overrides) => {
                info!("Loaded {} manual overrides from {:?}", overrides.len(), path);
                overrides
            }
            None => {
                warn!("Manual override file {:?} is not a JSON object, ignoring it", path);
                Self::default()
            }
        }
    }

    /// Parse an override document; `None` if it is not a JSON object
    pub fn from_json_str(content: &str) -> Option<Self> {
        let document: Value = serde_json::from_str(content).ok()?;
        let root = document.as_object()?;

        let doc_as_of = text_field(root, "as_of");
        let records = match root.get("series") {
            Some(Value::Object(series)) => series,
            _ => root,
        };

        let entries = records
            .iter()
            .filter_map(|(key, record)| {
                let record = record.as_object()?;
                Some((key.clone(), Self::parse_record(record, doc_as_of.as_deref())))
            })
            .collect();

        Some(Self { entries })
    }

    fn parse_record(record: &Map<String, Value>, doc_as_of: Option<&str>) -> ManualOverride {
        let value = match record.get("value") {
            Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()),
            Some(Value::String(s)) => parse_number(s),
            _ => None,
        };

        ManualOverride {
            value,
            unit: text_field(record, "unit"),
            source: text_field(record, "source"),
            as_of: text_field(record, "as_of").or_else(|| doc_as_of.map(str::to_string)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ManualOverride> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn text_field(obj: &Map<String, Value>, field: &str) -> Option<String> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
