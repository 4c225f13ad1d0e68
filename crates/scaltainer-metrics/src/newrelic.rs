//! Web latency metrics from the New Relic REST API (v2).
//!
//! Per application, two summarized metric-data queries over the trailing
//! window: `HttpDispatcher` (average call time + call count) and
//! `WebFrontend/QueueTime` (call count + average response time). The
//! service metric is
//!
//! ```text
//! http_avg_call_time + webfe_call_count * webfe_avg_response_time / http_call_count
//! ```
//!
//! An idle application reports zero call counts, so the division is 0/0
//! and the metric is NaN. NaN means "idle" and propagates as a valid
//! value; the web policy treats it as "no change".

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tracing::debug;

use scaltainer_state::{ScaleError, ScaleResult, ServiceConfig};

const DEFAULT_BASE_URL: &str = "https://api.newrelic.com/v2";

/// Summarized timeslice values for one metric query.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub(crate) struct TimesliceValues {
    pub call_count: f64,
    pub average_call_time: f64,
    pub average_response_time: f64,
}

/// Latency metric source for the web service group.
pub struct WebMetricSource {
    client: reqwest::Client,
    license_key: Option<String>,
    window: Duration,
    base_url: String,
}

impl WebMetricSource {
    /// Build a source with the given credential and trailing window.
    /// A missing credential is reported at fetch time so that an unused
    /// web group never blocks startup.
    pub fn new(license_key: Option<String>, window: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            license_key,
            window,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the source at a different API root (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch the averaged response-time metric for every web service.
    pub async fn fetch(
        &self,
        services: &BTreeMap<String, ServiceConfig>,
    ) -> ScaleResult<HashMap<String, f64>> {
        let key = self.license_key.as_deref().ok_or_else(|| {
            ScaleError::Configuration("NEW_RELIC_LICENSE_KEY not set in environment".into())
        })?;

        let to = Utc::now();
        let from = to - chrono::Duration::from_std(self.window).unwrap_or_default();
        let from = from.to_rfc3339_opts(SecondsFormat::Secs, true);
        let to = to.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut metrics = HashMap::new();
        for (name, config) in services {
            let app_id = config.newrelic_app_id.as_deref().ok_or_else(|| {
                ScaleError::Configuration(format!(
                    "service {name} does not have a corresponding newrelic_app_id"
                ))
            })?;

            let http = self
                .query(
                    key,
                    app_id,
                    &[
                        ("names[]", "HttpDispatcher"),
                        ("values[]", "average_call_time"),
                        ("values[]", "call_count"),
                    ],
                    &from,
                    &to,
                )
                .await
                .map_err(|e| attribute(e, name))?;
            let webfe = self
                .query(
                    key,
                    app_id,
                    &[
                        ("names[]", "WebFrontend/QueueTime"),
                        ("values[]", "call_count"),
                        ("values[]", "average_response_time"),
                    ],
                    &from,
                    &to,
                )
                .await
                .map_err(|e| attribute(e, name))?;

            let metric = compose_metric(&http, &webfe);
            debug!(service = %name, metric, "web metric retrieved");
            metrics.insert(name.clone(), metric);
        }
        Ok(metrics)
    }

    /// One summarized metric-data query against the application.
    async fn query(
        &self,
        key: &str,
        app_id: &str,
        names_and_values: &[(&str, &str)],
        from: &str,
        to: &str,
    ) -> ScaleResult<TimesliceValues> {
        let url = format!("{}/applications/{app_id}/metrics/data.json", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", key)
            .query(names_and_values)
            .query(&[("from", from), ("to", to), ("summarize", "true")])
            .send()
            .await
            .map_err(|e| ScaleError::Network(e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ScaleError::Network(e.to_string()))?;
        extract_values(&body)
    }
}

/// Attribute a per-query failure to the service it was fetched for.
fn attribute(e: ScaleError, service: &str) -> ScaleError {
    match e {
        ScaleError::Network(msg) => ScaleError::Network(format!(
            "could not retrieve metrics from New Relic API for {service}: {msg}"
        )),
        other => other,
    }
}

/// Pull the summarized timeslice values out of a metric-data response.
/// An upstream error payload surfaces with its own title; an otherwise
/// well-formed response with no timeslices yields all-zero values.
pub(crate) fn extract_values(body: &serde_json::Value) -> ScaleResult<TimesliceValues> {
    if let Some(title) = body
        .get("error")
        .and_then(|e| e.get("title"))
        .and_then(|t| t.as_str())
    {
        return Err(ScaleError::Network(title.to_string()));
    }

    let values = body
        .pointer("/metric_data/metrics/0/timeslices/0/values")
        .cloned()
        .unwrap_or_default();
    let field = |name: &str| values.get(name).and_then(|v| v.as_f64()).unwrap_or(0.0);

    Ok(TimesliceValues {
        call_count: field("call_count"),
        average_call_time: field("average_call_time"),
        average_response_time: field("average_response_time"),
    })
}

/// Combine the two query results into the service latency metric.
pub(crate) fn compose_metric(http: &TimesliceValues, webfe: &TimesliceValues) -> f64 {
    http.average_call_time
        + webfe.call_count * webfe.average_response_time / http.call_count
}
