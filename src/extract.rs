//! Extraction of scalar values from fetched payloads
//!
//! JSON lookups, freight-index page scraping and search-result symbol
//! resolution live here, apart from the merge logic, so a brittle page
//! pattern can be swapped out without touching anything else.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Follow a dotted path ("rates.TRY") through nested objects
pub fn json_lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| current.get(segment))
}

/// Numeric field at `path`; numeric strings are accepted, anything else is `None`
pub fn json_number(value: &Value, path: &str) -> Option<f64> {
    let number = match json_lookup(value, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

/// Non-empty string field at `path`
pub fn json_string(value: &Value, path: &str) -> Option<String> {
    match json_lookup(value, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Parse "1,234.5" style numbers; thousands separators are dropped
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<[^>]*>").expect("valid tag pattern")
});

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

static WEEK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bweek\s+of\s*:?\s*([a-z]{3,9}\.?\s+\d{1,2},?\s+\d{4}|\d{1,2}\s+[a-z]{3,9}\.?,?\s+\d{4}|\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4})",
    )
    .expect("valid week pattern")
});

static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:US\$|\$|USD\s?|€|£)\s*(-?\d[\d,]*(?:\.\d+)?)").expect("valid price pattern")
});

/// Longest stretch of text searched after a lane label for its price
const LANE_WINDOW: usize = 160;

/// Flatten markup to plain text with single spaces
pub fn html_to_text(html: &str) -> String {
    let text = TAG_RE.replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&#36;", "$")
        .replace("&#x24;", "$")
        .replace("&euro;", "€")
        .replace("&amp;", "&");
    WS_RE.replace_all(&text, " ").trim().to_string()
}

/// Values read from a weekly freight index page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FreightReport {
    /// The "Week of ..." label, if the page has one
    pub as_of: Option<String>,
    /// Lane label -> price; `None` when that lane could not be read
    pub lanes: BTreeMap<String, Option<f64>>,
}

/// Read the price of each lane from a freight index page
///
/// Each lane is searched independently: a missing or garbled lane does not
/// affect the others. The price is the first currency-prefixed number after
/// the lane label and before the next requested label.
pub fn extract_freight_lanes(raw: &str, lanes: &[&str]) -> FreightReport {
    let text = html_to_text(raw);

    let (as_of, body_start) = match WEEK_RE.captures(&text) {
        Some(caps) => {
            let whole = caps.get(0).map(|m| m.start()).unwrap_or(0);
            (caps.get(1).map(|m| m.as_str().to_string()), whole)
        }
        None => (None, 0),
    };

    let labels: Vec<(String, Option<Regex>)> = lanes
        .iter()
        .map(|lane| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(lane.trim()));
            (lane.to_string(), Regex::new(&pattern).ok())
        })
        .collect();

    // Start offsets of every lane-shaped label on the page, requested or not;
    // a lane's price window stops at the next one
    let families = lane_families(lanes);
    let mut boundaries: Vec<usize> = labels
        .iter()
        .filter_map(|(_, re)| re.as_ref())
        .chain(families.iter())
        .flat_map(|re| re.find_iter(&text).map(|m| m.start()).collect::<Vec<_>>())
        .collect();
    boundaries.sort_unstable();
    boundaries.dedup();

    let lanes = labels
        .iter()
        .map(|(lane, re)| {
            let value = re.as_ref().and_then(|re| {
                lane_price(&text, re, &boundaries, body_start)
                    .or_else(|| lane_price(&text, re, &boundaries, 0))
            });
            (lane.clone(), value)
        })
        .collect();

    FreightReport { as_of, lanes }
}

/// One pattern per label family: "FBX01" gives `\bFBX\d+\b`, which also
/// matches sibling lanes the caller did not ask for
fn lane_families(lanes: &[&str]) -> Vec<Regex> {
    let mut prefixes: Vec<String> = lanes
        .iter()
        .filter_map(|lane| {
            let lane = lane.trim();
            let prefix = lane.trim_end_matches(|c: char| c.is_ascii_digit());
            let numbered = prefix.len() < lane.len();
            (numbered && !prefix.is_empty()).then(|| prefix.to_uppercase())
        })
        .collect();
    prefixes.sort();
    prefixes.dedup();

    prefixes
        .iter()
        .filter_map(|prefix| Regex::new(&format!(r"(?i)\b{}\d+\b", regex::escape(prefix))).ok())
        .collect()
}

fn lane_price(text: &str, label: &Regex, boundaries: &[usize], from: usize) -> Option<f64> {
    let haystack = text.get(from..)?;
    label.find_iter(haystack).find_map(|m| {
        let start = from + m.end();
        let next_label = boundaries.iter().copied().find(|b| *b >= start).unwrap_or(text.len());
        let mut end = next_label.min(start + LANE_WINDOW).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let window = text.get(start..end)?;
        let caps = PRICE_RE.captures(window)?;
        parse_number(caps.get(1)?.as_str())
    })
}

/// One entry of a market-data search response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SymbolCandidate {
    #[serde(default, alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Code", alias = "ticker")]
    pub symbol: String,
}

/// Candidates from a search payload: a bare array, or an array under a
/// well-known field. Entries that are not candidate-shaped are skipped.
pub fn parse_candidates(payload: &Value) -> Vec<SymbolCandidate> {
    let entries = match payload {
        Value::Array(arr) => Some(arr),
        Value::Object(obj) => ["data", "results", "quotes", "items"]
            .iter()
            .find_map(|field| obj.get(*field).and_then(Value::as_array)),
        _ => None,
    };

    entries
        .map(|arr| {
            arr.iter()
                .filter_map(|v| SymbolCandidate::deserialize(v).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Pick a symbol from ordered search candidates
///
/// First candidate whose name+symbol contains every keyword
/// (case-insensitive), else the first with a non-empty symbol. Candidates
/// without a symbol are never picked.
pub fn resolve_symbol<'a, S: AsRef<str>>(
    candidates: &'a [SymbolCandidate],
    keywords: &[S],
) -> Option<&'a SymbolCandidate> {
    let keywords: Vec<String> = keywords.iter().map(|k| k.as_ref().to_lowercase()).collect();

    candidates
        .iter()
        .filter(|c| !c.symbol.trim().is_empty())
        .find(|c| {
            let haystack = format!("{} {}", c.name, c.symbol).to_lowercase();
            keywords.iter().all(|k| haystack.contains(k.as_str()))
        })
        .or_else(|| candidates.iter().find(|c| !c.symbol.trim().is_empty()))
}
