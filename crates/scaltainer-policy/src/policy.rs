//! Per-service-type scaling policy.
//!
//! Web services move by fixed quantities when the latency metric breaches
//! the configured response-time band; worker services scale proportionally
//! to backlog depth. Both are pure functions of (metric, config, current).

use scaltainer_state::{ScaleError, ScaleResult, ServiceConfig, ServiceKind};

/// Compute the desired replica count before bounds are applied.
///
/// The result is signed: a web service under light load may ask for fewer
/// replicas than its downscale quantity, and the clamp stage floors it.
pub fn desired_replicas(
    kind: ServiceKind,
    metric: f64,
    config: &ServiceConfig,
    current: u32,
) -> ScaleResult<i64> {
    match kind {
        ServiceKind::Web => web_desired(metric, config, current),
        ServiceKind::Worker => worker_desired(metric, config),
    }
}

/// Three-tier latency policy: up above the band, down below it, unchanged
/// inside it. A NaN metric (idle app, no traffic) compares false against
/// both bounds and falls through to "unchanged" — intended behavior, not
/// an omission.
fn web_desired(metric: f64, config: &ServiceConfig, current: u32) -> ScaleResult<i64> {
    let max_rt = config.max_response_time.ok_or_else(|| {
        ScaleError::Configuration("missing max_response_time in web service configuration".into())
    })?;
    let min_rt = config.min_response_time.ok_or_else(|| {
        ScaleError::Configuration("missing min_response_time in web service configuration".into())
    })?;
    if min_rt > max_rt {
        return Err(ScaleError::Configuration(
            "min_response_time and max_response_time are not in order".into(),
        ));
    }

    let current = current as i64;
    Ok(if metric > max_rt {
        current + config.upscale_quantity as i64
    } else if metric < min_rt {
        current - config.downscale_quantity as i64
    } else {
        current
    })
}

/// Proportional backlog policy: one replica per `ratio` units of backlog,
/// rounded up. Rejects negative and non-finite metrics outright — a
/// backlog count can never be either, so such a value is upstream garbage.
fn worker_desired(metric: f64, config: &ServiceConfig) -> ScaleResult<i64> {
    let ratio = config.ratio.ok_or_else(|| {
        ScaleError::Configuration("missing ratio in worker service configuration".into())
    })?;
    if ratio <= 0.0 {
        return Err(ScaleError::Configuration(format!(
            "ratio must be positive, got {ratio}"
        )));
    }
    if !metric.is_finite() || metric < 0.0 {
        return Err(ScaleError::Configuration(format!(
            "{metric} is an invalid metric value, must be a non-negative number"
        )));
    }
    Ok((metric / ratio).ceil() as i64)
}

/// Bound the desired count to `[min, max-or-∞]`.
pub fn clamp(desired: i64, config: &ServiceConfig) -> u32 {
    let mut adjusted = desired;
    if let Some(max) = config.max {
        adjusted = adjusted.min(max as i64);
    }
    adjusted = adjusted.max(config.min as i64);
    adjusted as u32
}
