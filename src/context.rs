//! Run provenance.
//!
//! An [`ExperimentContext`] is written as the header of every run log and
//! embedded in the nested JSON export, so a results file can always be
//! traced back to the machine, network location, version, and settings
//! that produced it.

use std::net::IpAddr;
use std::process::Command;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serp_search::Provider;

use crate::config::{ExperimentConfig, ProvenanceConfig, Treatment};

const UNKNOWN: &str = "unknown";

/// Provenance for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentContext {
    pub run_id: String,
    pub run_name: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub tool_version: String,
    #[serde(default)]
    pub search_version: String,
    pub os: String,
    pub arch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub provider_priority: Vec<Provider>,
    pub rerank_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment: Option<Treatment>,
    pub top_n: usize,
    /// Effective configuration, secrets omitted.
    pub config: serde_json::Value,
    /// Public IP and location, when the network lookup ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkLocation>,
}

/// Where the run's queries left from, as seen by public lookup services.
/// Unresolvable parts are `"unknown"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkLocation {
    pub public_ip: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub isp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

impl NetworkLocation {
    fn unknown(public_ip: String) -> Self {
        Self {
            public_ip,
            city: UNKNOWN.into(),
            region: UNKNOWN.into(),
            country: UNKNOWN.into(),
            isp: UNKNOWN.into(),
            lat: None,
            lon: None,
        }
    }
}

impl ExperimentContext {
    /// Capture provenance for a run starting now.
    pub fn capture(run_name: &str, config: &ExperimentConfig) -> Self {
        let rerank_enabled = config.rerank.enabled;
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            run_name: run_name.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            search_version: serp_search::VERSION.to_string(),
            os: std::env::consts::OS.to_owned(),
            arch: std::env::consts::ARCH.to_owned(),
            hostname: detect_hostname(),
            provider_priority: config.search.providers.clone(),
            rerank_enabled,
            model: rerank_enabled.then(|| config.rerank.model.clone()),
            treatment: rerank_enabled.then_some(config.rerank.treatment),
            top_n: config.top_n,
            config: config.snapshot(),
            network: None,
        }
    }
}

/// ip-api response, restricted to the requested fields.
#[derive(Debug, Deserialize)]
struct GeoResponse {
    status: String,
    city: Option<String>,
    #[serde(rename = "regionName")]
    region: Option<String>,
    country: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    isp: Option<String>,
    query: Option<String>,
}

/// Look up the public IP and its geolocation.
///
/// Never fails: any lookup that errors or times out leaves the affected
/// fields `"unknown"`.
pub async fn lookup_network(config: &ProvenanceConfig) -> NetworkLocation {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "cannot build provenance client");
            return NetworkLocation::unknown(UNKNOWN.into());
        }
    };

    let Some(ip) = public_ip(&client, &config.ip_endpoints).await else {
        tracing::warn!("public IP lookup failed; network provenance unknown");
        return NetworkLocation::unknown(UNKNOWN.into());
    };
    match geolocate(&client, &config.geo_endpoint, &ip).await {
        Some(location) => {
            tracing::info!(country = %location.country, city = %location.city, "network location captured");
            location
        }
        None => {
            tracing::warn!("geolocation lookup failed");
            NetworkLocation::unknown(ip)
        }
    }
}

async fn public_ip(client: &reqwest::Client, endpoints: &[String]) -> Option<String> {
    for endpoint in endpoints {
        let body = match client.get(endpoint).send().await.and_then(|r| r.error_for_status()) {
            Ok(resp) => resp.text().await,
            Err(e) => Err(e),
        };
        match body {
            Ok(text) if text.trim().parse::<IpAddr>().is_ok() => return Some(text.trim().to_string()),
            Ok(_) => tracing::debug!(endpoint = %endpoint, "IP service returned a non-address body"),
            Err(e) => tracing::debug!(endpoint = %endpoint, error = %e, "IP service failed"),
        }
    }
    None
}

async fn geolocate(client: &reqwest::Client, endpoint: &str, ip: &str) -> Option<NetworkLocation> {
    let url = format!("{}/{ip}", endpoint.trim_end_matches('/'));
    let resp = client
        .get(&url)
        .query(&[("fields", "status,city,regionName,country,lat,lon,isp,query")])
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| tracing::debug!(error = %e, "geolocation request failed"))
        .ok()?;
    let geo: GeoResponse = resp
        .json()
        .await
        .map_err(|e| tracing::debug!(error = %e, "geolocation body malformed"))
        .ok()?;
    if geo.status != "success" {
        return None;
    }
    let or_unknown = |v: Option<String>| v.unwrap_or_else(|| UNKNOWN.into());
    Some(NetworkLocation {
        public_ip: geo.query.unwrap_or_else(|| ip.to_string()),
        city: or_unknown(geo.city),
        region: or_unknown(geo.region),
        country: or_unknown(geo.country),
        isp: or_unknown(geo.isp),
        lat: geo.lat,
        lon: geo.lon,
    })
}

/// Best-effort hostname: `HOSTNAME`, then `/etc/hostname`, then `hostname`.
fn detect_hostname() -> Option<String> {
    let non_empty = |s: String| {
        let t = s.trim().to_owned();
        (!t.is_empty()).then_some(t)
    };
    std::env::var("HOSTNAME")
        .ok()
        .and_then(non_empty)
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok().and_then(non_empty))
        .or_else(|| {
            let out = Command::new("hostname").output().ok()?;
            if !out.status.success() {
                return None;
            }
            String::from_utf8(out.stdout).ok().and_then(non_empty)
        })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn lookup_config(server: &MockServer, ip_paths: &[&str]) -> ProvenanceConfig {
        ProvenanceConfig {
            network_lookup: true,
            ip_endpoints: ip_paths.iter().map(|p| format!("{}{p}", server.uri())).collect(),
            geo_endpoint: format!("{}/json", server.uri()),
            timeout_seconds: 2,
        }
    }

    #[tokio::test]
    async fn lookup_falls_through_ip_services_and_geolocates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ipify"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ifconfig"))
            .respond_with(ResponseTemplate::new(200).set_body_string("203.0.113.7\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/json/203.0.113.7"))
            .and(query_param("fields", "status,city,regionName,country,lat,lon,isp,query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "city": "Leeds",
                "regionName": "England",
                "country": "United Kingdom",
                "lat": 53.8,
                "lon": -1.55,
                "isp": "Example Broadband",
                "query": "203.0.113.7"
            })))
            .mount(&server)
            .await;

        let location = lookup_network(&lookup_config(&server, &["/ipify", "/ifconfig"])).await;
        assert_eq!(location.public_ip, "203.0.113.7");
        assert_eq!(location.city, "Leeds");
        assert_eq!(location.region, "England");
        assert_eq!(location.country, "United Kingdom");
        assert_eq!(location.isp, "Example Broadband");
        assert_eq!(location.lat, Some(53.8));
    }

    #[tokio::test]
    async fn failed_geolocation_keeps_the_ip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ip"))
            .respond_with(ResponseTemplate::new(200).set_body_string("198.51.100.4"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/json/198.51.100.4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "fail", "message": "reserved range"})),
            )
            .mount(&server)
            .await;

        let location = lookup_network(&lookup_config(&server, &["/ip"])).await;
        assert_eq!(location.public_ip, "198.51.100.4");
        assert_eq!(location.country, UNKNOWN);
    }

    #[tokio::test]
    async fn unreachable_services_give_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ip"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>blocked</html>"))
            .mount(&server)
            .await;

        let location = lookup_network(&lookup_config(&server, &["/ip"])).await;
        assert_eq!(location, NetworkLocation::unknown(UNKNOWN.into()));
    }

    #[test]
    fn capture_records_settings() {
        let config = ExperimentConfig::default();
        let ctx = ExperimentContext::capture("pilot", &config);
        assert_eq!(ctx.run_name, "pilot");
        assert_eq!(ctx.run_id.len(), 36);
        assert_eq!(ctx.provider_priority, config.search.providers);
        assert_eq!(ctx.model.as_deref(), Some("Qwen/Qwen3-32B-Instruct"));
        assert_eq!(ctx.treatment, Some(Treatment::ShowRank));
        assert_eq!(ctx.tool_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(ctx.search_version, serp_search::VERSION);
        assert!(ctx.finished_at.is_none());
        assert!(ctx.network.is_none());
    }

    #[test]
    fn baseline_run_has_no_model() {
        let mut config = ExperimentConfig::default();
        config.rerank.enabled = false;
        let ctx = ExperimentContext::capture("baseline", &config);
        assert!(!ctx.rerank_enabled);
        assert!(ctx.model.is_none());
        assert!(ctx.treatment.is_none());
    }

    #[test]
    fn snapshot_excludes_secrets() {
        let mut config = ExperimentConfig::default();
        config.rerank.hf_token = Some("hf_secret".into());
        let ctx = ExperimentContext::capture("pilot", &config);
        let json = serde_json::to_string(&ctx).unwrap_or_default();
        assert!(!json.contains("hf_secret"));
    }
}
