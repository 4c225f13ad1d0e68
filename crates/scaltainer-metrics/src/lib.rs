//! scaltainer-metrics — external load signals and metrics export.
//!
//! Two metric sources, one per service group:
//!
//! - [`WebMetricSource`]: averaged response latency per application from
//!   the New Relic REST API, over a trailing time window.
//! - [`WorkerMetricSource`]: queue/backlog counts from a single HTTP
//!   endpoint returning `[{name, quantity}, ...]`.
//!
//! A fetch returns one fully-populated name→metric map for the whole
//! group before any scaling decision runs (the batch barrier). NaN is a
//! legitimate metric value meaning "idle", never an error.
//!
//! [`PushGateway`] renders the last observed metric and replica count per
//! service into Prometheus text exposition and pushes it after each tick.

pub mod newrelic;
pub mod push;
pub mod source;
pub mod worker;

pub use newrelic::WebMetricSource;
pub use push::PushGateway;
pub use source::MetricSource;
pub use worker::WorkerMetricSource;
