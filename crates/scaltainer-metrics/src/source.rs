//! The closed set of metric sources, dispatched by service group.

use std::collections::{BTreeMap, HashMap};

use scaltainer_state::{ScaleError, ScaleResult, ServiceConfig};

use crate::newrelic::WebMetricSource;
use crate::worker::WorkerMetricSource;

/// A metric source for one service group.
pub enum MetricSource {
    Web(WebMetricSource),
    Worker(WorkerMetricSource),
}

impl MetricSource {
    /// Fetch the current metric for every configured service in the group.
    ///
    /// An empty service set is a `Warning` (the group is skipped, not the
    /// tick). The returned map is complete for the group: callers never
    /// decide against partial data.
    pub async fn fetch(
        &self,
        services: &BTreeMap<String, ServiceConfig>,
    ) -> ScaleResult<HashMap<String, f64>> {
        if services.is_empty() {
            return Err(ScaleError::Warning(format!(
                "no services configured for {} group",
                self.group_name()
            )));
        }
        match self {
            MetricSource::Web(source) => source.fetch(services).await,
            MetricSource::Worker(source) => source.fetch(services).await,
        }
    }

    fn group_name(&self) -> &'static str {
        match self {
            MetricSource::Web(_) => "web",
            MetricSource::Worker(_) => "worker",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_group_is_a_warning() {
        let source = MetricSource::Worker(WorkerMetricSource::new(
            Some("http://example.com/metrics"),
            None,
        ));
        let err = source.fetch(&BTreeMap::new()).await.unwrap_err();
        assert!(err.is_warning());
        assert!(err.to_string().contains("worker"));
    }
}
