//! Per-indicator fetch pipelines
//!
//! [`SourceCollector`] turns an [`IndicatorConfig`] into a [`Reading`] by
//! fetching the configured upstream and running the matching extractor.
//! Pages shared by several indicators are fetched once per run.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use urlencoding::encode;

use crate::config::{Config, IndicatorConfig, MarketDataConfig, SourceConfig};
use crate::extract::{extract_freight_lanes, json_number, json_string, parse_candidates, resolve_symbol, FreightReport};
use crate::http_client::Fetch;

/// Outcome of one indicator's fetch+extract step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reading {
    /// `None` when the upstream had no usable value
    pub value: Option<f64>,
    /// Provenance to record; empty keeps the prior one
    pub source_url: String,
    pub as_of: Option<String>,
}

/// Substitute `{name}` placeholders with URL-encoded values
pub fn render_url(template: &str, params: &[(&str, &str)]) -> String {
    params.iter().fold(template.to_string(), |url, (name, value)| {
        url.replace(&format!("{{{}}}", name), &encode(value))
    })
}

/// URL without its query string, safe to publish (no credentials)
fn public_url(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}

/// Fetches and extracts readings for configured indicators
pub struct SourceCollector<'a> {
    fetcher: &'a dyn Fetch,
    market: MarketDataConfig,
    api_key: String,
    /// Every lane requested from each freight page
    lanes_by_url: HashMap<String, Vec<String>>,
    /// Per-run page cache; failures are cached as their error text
    reports: HashMap<String, std::result::Result<FreightReport, String>>,
}

impl<'a> SourceCollector<'a> {
    pub fn new(fetcher: &'a dyn Fetch, config: &Config, api_key: String) -> Self {
        let mut lanes_by_url: HashMap<String, Vec<String>> = HashMap::new();
        for indicator in &config.indicators {
            if let SourceConfig::FreightPage { url, lane } = &indicator.source {
                lanes_by_url.entry(url.clone()).or_default().push(lane.clone());
            }
        }

        Self {
            fetcher,
            market: config.market_data.clone(),
            api_key,
            lanes_by_url,
            reports: HashMap::new(),
        }
    }

    /// Read the current value for one indicator
    pub async fn read(&mut self, indicator: &IndicatorConfig) -> Result<Reading> {
        match &indicator.source {
            SourceConfig::JsonField { url, field, as_of_field } => {
                self.read_json_field(url, field, as_of_field.as_deref()).await
            }
            SourceConfig::MarketSearch { query, keywords } => {
                self.read_market_search(query, keywords).await
            }
            SourceConfig::FreightPage { url, lane } => self.read_freight_lane(url, lane).await,
            SourceConfig::Manual => Ok(Reading::default()),
        }
    }

    async fn read_json_field(&self, url: &str, field: &str, as_of_field: Option<&str>) -> Result<Reading> {
        let payload = self.fetcher.get_json(url).await?;

        let value = json_number(&payload, field);
        if value.is_none() {
            warn!("Field '{}' missing or not numeric in response from {}", field, url);
        }

        Ok(Reading {
            value,
            source_url: url.to_string(),
            as_of: as_of_field.and_then(|f| json_string(&payload, f)),
        })
    }

    async fn read_market_search(&self, query: &str, keywords: &[String]) -> Result<Reading> {
        let search_url = render_url(&self.market.search_url, &[("query", query), ("api_key", self.api_key.as_str())]);
        let results = self.fetcher.get_json(&search_url).await?;

        let candidates = parse_candidates(&results);
        let picked = resolve_symbol(&candidates, keywords)
            .with_context(|| format!("No symbol found for '{}' ({} candidates)", query, candidates.len()))?;
        info!("Resolved '{}' to {} ({})", query, picked.symbol, picked.name);

        let quote_url = render_url(
            &self.market.quote_url,
            &[("symbol", picked.symbol.as_str()), ("api_key", self.api_key.as_str())],
        );
        let quote = self.fetcher.get_json(&quote_url).await?;
        let quote = match &quote {
            Value::Array(arr) => arr.first().unwrap_or(&Value::Null),
            other => other,
        };

        let value = json_number(quote, &self.market.quote_field);
        if value.is_none() {
            warn!("Quote for {} has no numeric '{}'", picked.symbol, self.market.quote_field);
        }

        Ok(Reading {
            value,
            source_url: public_url(&quote_url),
            as_of: None,
        })
    }

    async fn read_freight_lane(&mut self, url: &str, lane: &str) -> Result<Reading> {
        if !self.reports.contains_key(url) {
            let report = self.fetch_freight_report(url).await.map_err(|e| format!("{:#}", e));
            self.reports.insert(url.to_string(), report);
        }

        let report = match self.reports.get(url) {
            Some(Ok(report)) => report,
            Some(Err(reason)) => anyhow::bail!("freight page unavailable: {}", reason),
            None => anyhow::bail!("freight page {} was not fetched", url),
        };

        let value = report.lanes.get(lane).copied().flatten();
        if value.is_none() {
            warn!("Lane {} not found on {}", lane, url);
        }

        Ok(Reading {
            value,
            source_url: url.to_string(),
            as_of: report.as_of.clone(),
        })
    }

    async fn fetch_freight_report(&self, url: &str) -> Result<FreightReport> {
        let text = self.fetcher.get_text(url).await?;

        let lanes: Vec<&str> = self
            .lanes_by_url
            .get(url)
            .map(|lanes| lanes.iter().map(String::as_str).collect())
            .unwrap_or_default();

        let report = extract_freight_lanes(&text, &lanes);
        debug!("Freight page {} (as of {:?}): {:?}", url, report.as_of, report.lanes);
        Ok(report)
    }
}
