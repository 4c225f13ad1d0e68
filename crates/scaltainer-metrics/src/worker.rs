//! Worker backlog metrics from a single HTTP endpoint.
//!
//! The endpoint returns a JSON array of `{name, quantity}` objects, one
//! per queue. The endpoint URL may carry a `$HIREFIRE_TOKEN` placeholder
//! substituted exactly once, at construction, from the collaborator-
//! supplied secret.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use tracing::debug;

use scaltainer_state::{ScaleError, ScaleResult, ServiceConfig};

const TOKEN_PLACEHOLDER: &str = "$HIREFIRE_TOKEN";

/// One entry of the endpoint's response body.
#[derive(Debug, Deserialize)]
struct QueueDepth {
    name: String,
    quantity: f64,
}

/// Backlog metric source for the worker service group.
pub struct WorkerMetricSource {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl WorkerMetricSource {
    /// Build a source from the configured endpoint template, substituting
    /// the token placeholder once. An unset token substitutes as empty.
    pub fn new(endpoint: Option<&str>, token: Option<&str>) -> Self {
        let endpoint =
            endpoint.map(|e| e.replace(TOKEN_PLACEHOLDER, token.unwrap_or_default()));
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    /// Fetch the backlog count for every queue the endpoint reports.
    pub async fn fetch(
        &self,
        _services: &BTreeMap<String, ServiceConfig>,
    ) -> ScaleResult<HashMap<String, f64>> {
        let endpoint = self.endpoint.as_deref().ok_or_else(|| {
            ScaleError::Configuration(
                "worker services configured but no endpoint set".into(),
            )
        })?;

        let response = self.client.get(endpoint).send().await.map_err(|e| {
            ScaleError::Network(format!(
                "could not retrieve metrics from application endpoint {endpoint}: {e}"
            ))
        })?;
        let body = response.text().await.map_err(|e| {
            ScaleError::Network(format!(
                "could not retrieve metrics from application endpoint {endpoint}: {e}"
            ))
        })?;

        let metrics = parse_body(&body)?;
        debug!(queues = metrics.len(), "worker metrics retrieved");
        Ok(metrics)
    }
}

/// Parse the endpoint body into a name→quantity map.
///
/// A body that isn't JSON at all and a JSON body of the wrong shape are
/// distinct configuration errors, each carrying a snippet of the body for
/// diagnosis.
fn parse_body(body: &str) -> ScaleResult<HashMap<String, f64>> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|_| {
        ScaleError::Configuration(format!(
            "app endpoint returned non json response: {}",
            snippet(body)
        ))
    })?;
    let entries: Vec<QueueDepth> = serde_json::from_value(value).map_err(|_| {
        ScaleError::Configuration(format!(
            "app endpoint returned unexpected json response: {}",
            snippet(body)
        ))
    })?;
    Ok(entries.into_iter().map(|q| (q.name, q.quantity)).collect())
}

/// First 128 bytes of the body, for error messages.
fn snippet(body: &str) -> &str {
    let end = body
        .char_indices()
        .take_while(|(i, _)| *i < 128)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_queue_array() {
        let metrics = parse_body(
            r#"[{"name": "mailer", "quantity": 10}, {"name": "indexer", "quantity": 0}]"#,
        )
        .unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics["mailer"], 10.0);
        assert_eq!(metrics["indexer"], 0.0);
    }

    #[test]
    fn empty_array_is_valid() {
        assert!(parse_body("[]").unwrap().is_empty());
    }

    #[test]
    fn non_json_body_is_configuration_error() {
        let err = parse_body("<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, ScaleError::Configuration(_)));
        assert!(err.to_string().contains("non json response"));
        assert!(err.to_string().contains("502 Bad Gateway"));
    }

    #[test]
    fn wrong_shape_is_configuration_error() {
        for body in [r#"{"name": "mailer"}"#, r#"[{"queue": "mailer"}]"#, "42"] {
            let err = parse_body(body).unwrap_err();
            assert!(matches!(err, ScaleError::Configuration(_)), "body: {body}");
            assert!(err.to_string().contains("unexpected json response"));
        }
    }

    #[test]
    fn error_snippet_is_bounded() {
        let long_body = "x".repeat(4096);
        let err = parse_body(&long_body).unwrap_err();
        assert!(err.to_string().len() < 256);
    }

    #[test]
    fn token_substituted_at_construction() {
        let source = WorkerMetricSource::new(
            Some("https://example.com/hirefire/$HIREFIRE_TOKEN/info"),
            Some("s3cret"),
        );
        assert_eq!(
            source.endpoint.as_deref(),
            Some("https://example.com/hirefire/s3cret/info")
        );
    }

    #[test]
    fn missing_token_substitutes_empty() {
        let source =
            WorkerMetricSource::new(Some("https://example.com/$HIREFIRE_TOKEN/info"), None);
        assert_eq!(
            source.endpoint.as_deref(),
            Some("https://example.com//info")
        );
    }

    #[tokio::test]
    async fn missing_endpoint_is_configuration_error() {
        let source = WorkerMetricSource::new(None, None);
        let err = source.fetch(&BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, ScaleError::Configuration(_)));
    }
}
