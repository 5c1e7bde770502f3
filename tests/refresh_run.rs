use market_pulse::{run, Config, IndicatorConfig, MarketDataConfig, Snapshot, SourceConfig};
use serde_json::json;
use std::fs;
use std::path::Path;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FBX_PAGE: &str = r#"<html><body>
<h3>Week of Nov 21, 2024</h3>
<ul>
  <li><span>FBX01</span> China - N. America West Coast <strong>$4,321</strong></li>
  <li><span>FBX03</span> China - N. America East Coast <strong>$5,950</strong></li>
</ul>
</body></html>"#;

fn indicator(key: &str, name: &str, unit: &str, format: &str, source: SourceConfig) -> IndicatorConfig {
    IndicatorConfig {
        key: key.to_string(),
        name: name.to_string(),
        unit: unit.to_string(),
        format: format.to_string(),
        source,
    }
}

fn config_for(server: &MockServer, data_dir: &Path) -> Config {
    let base = server.uri();
    Config {
        data_dir: data_dir.to_path_buf(),
        timeout_secs: 5,
        api_key_env: "MARKET_PULSE_TEST_UNSET_KEY".to_string(),
        market_data: MarketDataConfig {
            search_url: format!("{}/search/{{query}}?api_token={{api_key}}", base),
            quote_url: format!("{}/quote/{{symbol}}?api_token={{api_key}}", base),
            quote_field: "close".to_string(),
        },
        indicators: vec![
            indicator(
                "usdtry",
                "USD/TRY",
                "TRY per USD",
                "fx",
                SourceConfig::JsonField {
                    url: format!("{}/latest", base),
                    field: "rates.TRY".to_string(),
                    as_of_field: Some("date".to_string()),
                },
            ),
            indicator(
                "bdi",
                "Baltic Dry Index",
                "Index",
                "number",
                SourceConfig::MarketSearch {
                    query: "baltic dry".to_string(),
                    keywords: vec!["baltic".to_string(), "dry".to_string()],
                },
            ),
            indicator(
                "fbx01",
                "FBX01",
                "USD/40ft",
                "usd",
                SourceConfig::FreightPage { url: format!("{}/fbx", base), lane: "FBX01".to_string() },
            ),
            indicator("wci", "World Container Index", "USD/40ft", "usd", SourceConfig::Manual),
        ],
        ..Config::default()
    }
}

fn read_snapshot(config: &Config) -> Snapshot {
    serde_json::from_str(&fs::read_to_string(config.output_path()).unwrap()).unwrap()
}

#[tokio::test]
async fn test_first_run_with_partial_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"date": "2024-11-25", "rates": {"TRY": 34.2}})))
        .mount(&server)
        .await;
    // Market-data search is down
    Mock::given(method("GET"))
        .and(path("/search/baltic%20dry"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fbx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FBX_PAGE))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("manual.json"),
        r#"{"as_of": "2024-11-21", "series": {"wci": {"value": 1850, "source": "https://www.drewry.co.uk"}}}"#,
    )
    .unwrap();

    let config = config_for(&server, dir.path());
    let summary = run(&config).await.unwrap();
    assert_eq!(summary.appended, 3);
    assert_eq!(summary.missing, 1);

    let snapshot = read_snapshot(&config);
    let keys: Vec<&str> = snapshot.items.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, vec!["bdi", "fbx01", "usdtry", "wci"]);

    let bdi = &snapshot.items[0];
    assert_eq!(bdi.name, "Baltic Dry Index");
    assert!(bdi.series.is_empty());

    let fbx01 = &snapshot.items[1];
    assert_eq!(fbx01.series[0].v, 4321.0);
    assert_eq!(fbx01.as_of.as_deref(), Some("Nov 21, 2024"));

    let usdtry = &snapshot.items[2];
    assert_eq!(usdtry.series.len(), 1);
    assert_eq!(usdtry.series[0].v, 34.2);
    assert_eq!(usdtry.as_of.as_deref(), Some("2024-11-25"));

    let wci = &snapshot.items[3];
    assert_eq!(wci.series[0].v, 1850.0);
    assert_eq!(wci.source_url, "https://www.drewry.co.uk");
    assert_eq!(wci.as_of.as_deref(), Some("2024-11-21"));
}

#[tokio::test]
async fn test_second_run_keeps_history_of_failed_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/baltic%20dry"))
        .and(query_param("api_token", "guest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"Name": "Baltic Trading", "Code": "BALT"},
            {"Name": "Baltic Dry Index", "Code": "BDIY"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/quote/BDIY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": "BDIY", "close": 1530.0})))
        .mount(&server)
        .await;
    // FX API and freight page are unavailable for this run

    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&server, dir.path());

    let prior = json!({
        "generated_at": "2024-11-24T06:00:00Z",
        "items": [
            {"key": "usdtry", "name": "USD/TRY", "unit": "TRY per USD", "format": "fx",
             "source_url": "https://api.frankfurter.dev/v1/latest",
             "series": [{"t": "2024-11-23T06:00:00Z", "v": 34.1}, {"t": "2024-11-24T06:00:00Z", "v": 34.15}]}
        ]
    });
    fs::write(config.output_path(), serde_json::to_string_pretty(&prior).unwrap()).unwrap();

    let summary = run(&config).await.unwrap();
    assert_eq!(summary.appended, 1);

    let snapshot = read_snapshot(&config);
    let usdtry = snapshot.items.iter().find(|i| i.key == "usdtry").unwrap();
    assert_eq!(
        serde_json::to_value(&usdtry.series).unwrap(),
        prior["items"][0]["series"]
    );
    // Prior provenance survives a run that produced no value
    assert_eq!(usdtry.source_url, "https://api.frankfurter.dev/v1/latest");

    let bdi = snapshot.items.iter().find(|i| i.key == "bdi").unwrap();
    assert_eq!(bdi.series.len(), 1);
    assert_eq!(bdi.series[0].v, 1530.0);
    assert!(bdi.source_url.ends_with("/quote/BDIY"));
    assert!(!bdi.source_url.contains("api_token"));

    let wci = snapshot.items.iter().find(|i| i.key == "wci").unwrap();
    assert!(wci.series.is_empty());
    assert!(snapshot.generated_at > chrono::DateTime::parse_from_rfc3339("2024-11-24T06:00:00Z").unwrap());
}
