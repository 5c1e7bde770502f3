//! Configuration module for market pulse
//!
//! This module defines where snapshots live on disk, how upstream sources are
//! reached, and which indicators are refreshed on every run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Credential used when no API key is present in the environment
pub const GUEST_API_KEY: &str = "guest";

/// Maximum number of points kept per indicator series
pub const DEFAULT_HISTORY_LIMIT: usize = 120;

/// Where an indicator's value comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// A JSON endpoint; `field` is a dotted path (e.g. "rates.TRY")
    JsonField {
        url: String,
        field: String,
        /// Optional dotted path of an as-of label in the same payload
        #[serde(default)]
        as_of_field: Option<String>,
    },
    /// Search the market-data API, pick a symbol, then read its quote
    MarketSearch {
        query: String,
        #[serde(default)]
        keywords: Vec<String>,
    },
    /// A lane on the weekly freight index page (e.g. "FBX01")
    FreightPage { url: String, lane: String },
    /// Only the manual override document supplies values
    Manual,
}

/// One tracked indicator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub key: String,
    pub name: String,
    pub unit: String,
    /// Rendering hint for consumers: "number", "usd", "fx", ...
    pub format: String,
    pub source: SourceConfig,
}

impl IndicatorConfig {
    fn new(key: &str, name: &str, unit: &str, format: &str, source: SourceConfig) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            unit: unit.to_string(),
            format: format.to_string(),
            source,
        }
    }
}

/// Market-data API endpoints
///
/// Placeholders: `{query}`, `{symbol}` and `{api_key}` are substituted
/// (URL-encoded) before each request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    pub search_url: String,
    pub quote_url: String,
    /// Field of the quote payload holding the last price
    pub quote_field: String,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            search_url: "https://eodhd.com/api/search/{query}?api_token={api_key}&fmt=json".to_string(),
            quote_url: "https://eodhd.com/api/real-time/{symbol}?api_token={api_key}&fmt=json".to_string(),
            quote_field: "close".to_string(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the snapshot and the manual override file
    pub data_dir: PathBuf,
    /// Snapshot file name, relative to `data_dir` unless absolute
    pub output_file: PathBuf,
    /// Manual override file name, relative to `data_dir` unless absolute
    pub manual_file: PathBuf,
    /// User-Agent sent with every request
    pub user_agent: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    pub history_limit: usize,
    /// Environment variable holding the market-data API key
    pub api_key_env: String,
    pub market_data: MarketDataConfig,
    /// Indicators, processed in this order
    pub indicators: Vec<IndicatorConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_file: PathBuf::from("market.json"),
            manual_file: PathBuf::from("manual.json"),
            user_agent: format!("market-pulse/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 20,
            history_limit: DEFAULT_HISTORY_LIMIT,
            api_key_env: "MARKET_DATA_API_KEY".to_string(),
            market_data: MarketDataConfig::default(),
            indicators: default_indicators(),
        }
    }
}

fn default_indicators() -> Vec<IndicatorConfig> {
    const FBX_URL: &str = "https://www.freightos.com/enterprise/terminal/freightos-baltic-index-global-container-pricing-index/";

    vec![
        IndicatorConfig::new(
            "usdtry",
            "USD/TRY",
            "TRY per USD",
            "fx",
            SourceConfig::JsonField {
                url: "https://api.frankfurter.dev/v1/latest?base=USD&symbols=TRY".to_string(),
                field: "rates.TRY".to_string(),
                as_of_field: Some("date".to_string()),
            },
        ),
        IndicatorConfig::new(
            "bdi",
            "Baltic Dry Index",
            "Index",
            "number",
            SourceConfig::MarketSearch {
                query: "baltic dry index".to_string(),
                keywords: vec!["baltic".to_string(), "dry".to_string()],
            },
        ),
        IndicatorConfig::new(
            "fbx01",
            "FBX01 China/East Asia to North America West Coast",
            "USD/40ft",
            "usd",
            SourceConfig::FreightPage { url: FBX_URL.to_string(), lane: "FBX01".to_string() },
        ),
        IndicatorConfig::new(
            "fbx03",
            "FBX03 China/East Asia to North America East Coast",
            "USD/40ft",
            "usd",
            SourceConfig::FreightPage { url: FBX_URL.to_string(), lane: "FBX03".to_string() },
        ),
        IndicatorConfig::new(
            "fbx11",
            "FBX11 China/East Asia to North Europe",
            "USD/40ft",
            "usd",
            SourceConfig::FreightPage { url: FBX_URL.to_string(), lane: "FBX11".to_string() },
        ),
        IndicatorConfig::new(
            "wci",
            "Drewry World Container Index",
            "USD/40ft",
            "usd",
            SourceConfig::Manual,
        ),
    ]
}

impl Config {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config YAML")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would break snapshot invariants
    pub fn validate(&self) -> Result<()> {
        if self.history_limit == 0 {
            anyhow::bail!("history_limit must be at least 1");
        }
        let mut seen = std::collections::HashSet::new();
        for indicator in &self.indicators {
            if indicator.key.trim().is_empty() {
                anyhow::bail!("Indicator with empty key in configuration");
            }
            if !seen.insert(indicator.key.as_str()) {
                anyhow::bail!("Duplicate indicator key in configuration: {}", indicator.key);
            }
        }
        Ok(())
    }

    /// Full path of the snapshot document
    pub fn output_path(&self) -> PathBuf {
        self.data_dir.join(&self.output_file)
    }

    /// Full path of the manual override document
    pub fn manual_path(&self) -> PathBuf {
        self.data_dir.join(&self.manual_file)
    }

    /// API key from the configured environment variable, or the guest key
    pub fn api_key(&self) -> String {
        resolve_api_key(std::env::var(&self.api_key_env).ok())
    }
}

fn resolve_api_key(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| GUEST_API_KEY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parsing() {
        let yaml = r#"
data_dir: "/srv/site/data"
timeout_secs: 25
indicators:
  - key: usdtry
    name: "USD/TRY"
    unit: "TRY per USD"
    format: fx
    source:
      kind: json_field
      url: "https://api.frankfurter.dev/v1/latest?base=USD&symbols=TRY"
      field: "rates.TRY"
  - key: fbx01
    name: "FBX01"
    unit: "USD/40ft"
    format: usd
    source:
      kind: freight_page
      url: "https://example.com/fbx"
      lane: "FBX01"
  - key: wci
    name: "WCI"
    unit: "USD/40ft"
    format: usd
    source:
      kind: manual
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.timeout_secs, 25);
        assert_eq!(config.history_limit, 120);
        assert_eq!(config.indicators.len(), 3);
        assert_eq!(config.output_path(), PathBuf::from("/srv/site/data/market.json"));
        assert_eq!(config.indicators[2].source, SourceConfig::Manual);
        match &config.indicators[0].source {
            SourceConfig::JsonField { field, as_of_field, .. } => {
                assert_eq!(field, "rates.TRY");
                assert_eq!(as_of_field, &None);
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.output_path(), PathBuf::from("data/market.json"));
        assert_eq!(config.manual_path(), PathBuf::from("data/manual.json"));
        let keys: Vec<&str> = config.indicators.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["usdtry", "bdi", "fbx01", "fbx03", "fbx11", "wci"]);
        config.validate().unwrap();
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let mut config = Config::default();
        let first = config.indicators[0].clone();
        config.indicators.push(first);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_fallback() {
        assert_eq!(resolve_api_key(None), "guest");
        assert_eq!(resolve_api_key(Some("  ".to_string())), "guest");
        assert_eq!(resolve_api_key(Some("abc123".to_string())), "abc123");
    }
}
