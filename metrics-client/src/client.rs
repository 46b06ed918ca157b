use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsClientError {
    #[error("request to {0} failed: {1}")]
    Request(String, reqwest::Error),
    #[error("endpoint returned non-success HTTP status {0}")]
    HttpStatus(u16),
    #[error("endpoint reported status=error: {0}")]
    QueryStatus(String),
    #[error("failed to decode response body: {0}")]
    Decode(String),
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    data: Option<QueryData>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    result: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    value: (serde_json::Value, serde_json::Value),
}

/// A synchronous (request/await) client for the external time-series
/// endpoint described in §6.3: `GET /api/v1/query?query=...`, decoding a
/// `status`/`data.result[].value` shaped response. `found=false` means a
/// well-formed response with no data points — distinct from an error.
pub struct MetricsClient {
    http: reqwest::Client,
    base_url: String,
}

impl MetricsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Returns `Ok(Some(value))` when a scalar sample was found,
    /// `Ok(None)` when the query was well-formed but returned no data
    /// points, and `Err` for any non-2xx, `status=error`, decode
    /// failure, or timeout.
    pub async fn query(&self, query: &str, deadline: Duration) -> Result<Option<f64>, MetricsClientError> {
        let url = format!("{}/api/v1/query", self.base_url.trim_end_matches('/'));

        let response = self
            .http
            .get(&url)
            .query(&[("query", query)])
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MetricsClientError::Timeout(deadline)
                } else {
                    MetricsClientError::Request(url.clone(), e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetricsClientError::HttpStatus(status.as_u16()));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| MetricsClientError::Decode(e.to_string()))?;

        if body.status != "success" {
            return Err(MetricsClientError::QueryStatus(
                body.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        let Some(data) = body.data else {
            return Ok(None);
        };
        let Some(first) = data.result.first() else {
            return Ok(None);
        };

        let value = parse_scalar(&first.value.1)
            .ok_or_else(|| MetricsClientError::Decode("sample value was neither a string nor a number".to_string()))?;
        Ok(Some(value))
    }
}

fn parse_scalar(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}
