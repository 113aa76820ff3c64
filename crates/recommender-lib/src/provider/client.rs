//! HTTP client for the Prometheus instant-query API

use super::ProviderError;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// One decoded sample
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// A label set with its single sample from an instant vector
#[derive(Debug, Clone, PartialEq)]
pub struct Timeseries {
    pub labels: HashMap<String, String>,
    pub sample: Sample,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorEntry {
    #[serde(default)]
    metric: HashMap<String, String>,
    value: (f64, String),
}

/// Client for `GET /api/v1/query`
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    http: Client,
    base_url: Url,
}

impl PrometheusClient {
    pub fn new(address: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let mut base_url = Url::parse(address)
            .map_err(|e| ProviderError::InvalidAddress(address.to_string(), e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::InvalidAddress(
                address.to_string(),
                "address cannot be used as a base URL".to_string(),
            ));
        }
        // Keep any path prefix when joining the API path
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self { http, base_url })
    }

    pub fn address(&self) -> &str {
        self.base_url.as_str()
    }

    /// Evaluate an instant query and return its vector result
    pub async fn get_timeseries(&self, query: &str) -> Result<Vec<Timeseries>, ProviderError> {
        let url = self
            .base_url
            .join("api/v1/query")
            .map_err(|e| ProviderError::InvalidAddress(self.base_url.to_string(), e.to_string()))?;

        let response = self
            .http
            .get(url)
            .query(&[("query", query)])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        // Prometheus reports query errors as JSON on 4xx/5xx too
        match serde_json::from_slice::<QueryResponse>(&body) {
            Ok(parsed) => decode_response(parsed),
            Err(_) if !status.is_success() => Err(ProviderError::BadStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            }),
            Err(e) => Err(ProviderError::Malformed(e.to_string())),
        }
    }
}

fn decode_response(response: QueryResponse) -> Result<Vec<Timeseries>, ProviderError> {
    if response.status != "success" {
        return Err(ProviderError::Query {
            error_type: response.error_type.unwrap_or_else(|| response.status.clone()),
            message: response.error.unwrap_or_default(),
        });
    }

    let data = response
        .data
        .ok_or_else(|| ProviderError::Malformed("response has no data".to_string()))?;
    if data.result_type != "vector" {
        return Err(ProviderError::Malformed(format!(
            "expected a vector result, got {}",
            data.result_type
        )));
    }

    let entries: Vec<VectorEntry> = serde_json::from_value(data.result)
        .map_err(|e| ProviderError::Malformed(e.to_string()))?;

    entries
        .into_iter()
        .map(|entry| {
            let (timestamp, raw) = entry.value;
            let value = raw
                .parse::<f64>()
                .map_err(|_| ProviderError::Malformed(format!("sample value '{}'", raw)))?;
            Ok(Timeseries {
                labels: entry.metric,
                sample: Sample {
                    timestamp: timestamp_from_secs(timestamp)?,
                    value,
                },
            })
        })
        .collect()
}

fn timestamp_from_secs(secs: f64) -> Result<DateTime<Utc>, ProviderError> {
    let whole = secs.trunc();
    let nanos = ((secs - whole) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
        .ok_or_else(|| ProviderError::Malformed(format!("sample timestamp {}", secs)))
}
