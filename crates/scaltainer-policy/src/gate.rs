//! Sensitivity gate — per-service hysteresis over scale decisions.
//!
//! The two persisted counters are the whole state machine: both zero is
//! idle, a non-zero counter is an in-progress breach streak in that
//! direction. A decision is applied only on the Nth consecutive
//! same-direction breach, where N is the configured sensitivity.

use tracing::debug;

use scaltainer_state::{ScaleResult, ServiceConfig, ServiceKind, ServiceState};

use crate::policy::{clamp, desired_replicas};

/// Outcome of gating one desired-vs-current diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Apply the adjusted replica count now.
    Apply(u32),
    /// A breach is in progress but hasn't reached its threshold (or is
    /// suppressed by downscale eligibility); counters recorded, no action.
    Hold,
    /// No breach; both counters reset.
    NoOp,
}

/// Gate one diff through the hysteresis counters, updating them in place.
///
/// Downscale eligibility: web services may always scale down; a worker may
/// only when its backlog metric is exactly zero or it is explicitly marked
/// `decrementable`. An ineligible downward breach holds with *both*
/// counters untouched — unlike every other branch, it does not reset the
/// opposing counter, so an in-progress upscale streak survives suppressed
/// down-breaches. Long-standing behavior, pinned by tests; do not "fix".
pub fn decide(
    diff: i64,
    adjusted: u32,
    metric: f64,
    kind: ServiceKind,
    config: &ServiceConfig,
    state: &mut ServiceState,
) -> GateDecision {
    if diff > 0 {
        state.upscale_sensitivity += 1;
        state.downscale_sensitivity = 0;
        if state.upscale_sensitivity >= config.upscale_sensitivity {
            state.upscale_sensitivity = 0;
            GateDecision::Apply(adjusted)
        } else {
            debug!(
                level = state.upscale_sensitivity,
                required = config.upscale_sensitivity,
                "scale up held by upscale_sensitivity"
            );
            GateDecision::Hold
        }
    } else if diff < 0 {
        let eligible = kind == ServiceKind::Web || metric == 0.0 || config.decrementable;
        if !eligible {
            debug!("scale down held: non-decrementable worker with non-zero backlog");
            return GateDecision::Hold;
        }
        state.downscale_sensitivity += 1;
        state.upscale_sensitivity = 0;
        if state.downscale_sensitivity >= config.downscale_sensitivity {
            state.downscale_sensitivity = 0;
            GateDecision::Apply(adjusted)
        } else {
            debug!(
                level = state.downscale_sensitivity,
                required = config.downscale_sensitivity,
                "scale down held by downscale_sensitivity"
            );
            GateDecision::Hold
        }
    } else {
        state.upscale_sensitivity = 0;
        state.downscale_sensitivity = 0;
        GateDecision::NoOp
    }
}

/// The composed per-service pipeline: policy → clamp → gate.
///
/// This is the entire decision for one service in one tick; everything
/// around it is I/O.
pub fn plan(
    kind: ServiceKind,
    metric: f64,
    config: &ServiceConfig,
    current: u32,
    state: &mut ServiceState,
) -> ScaleResult<GateDecision> {
    let desired = desired_replicas(kind, metric, config, current)?;
    let adjusted = clamp(desired, config);
    let diff = adjusted as i64 - current as i64;
    Ok(decide(diff, adjusted, metric, kind, config, state))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(up_sens: u32, down_sens: u32) -> ServiceConfig {
        ServiceConfig {
            upscale_sensitivity: up_sens,
            downscale_sensitivity: down_sens,
            ..Default::default()
        }
    }

    #[test]
    fn default_threshold_applies_on_first_breach() {
        let mut state = ServiceState::default();
        let decision = decide(1, 6, 10.0, ServiceKind::Web, &config(1, 1), &mut state);
        assert_eq!(decision, GateDecision::Apply(6));
        assert_eq!(state.upscale_sensitivity, 0);
    }

    #[test]
    fn upscale_threshold_counts_consecutive_breaches() {
        // Threshold T: exactly the T-th consecutive call applies; every
        // earlier call holds with the counter equal to its index.
        let cfg = config(3, 1);
        let mut state = ServiceState::default();

        for expected_counter in 1..3 {
            let decision = decide(2, 7, 10.0, ServiceKind::Web, &cfg, &mut state);
            assert_eq!(decision, GateDecision::Hold);
            assert_eq!(state.upscale_sensitivity, expected_counter);
        }
        let decision = decide(2, 7, 10.0, ServiceKind::Web, &cfg, &mut state);
        assert_eq!(decision, GateDecision::Apply(7));
        assert_eq!(state.upscale_sensitivity, 0);
    }

    #[test]
    fn downscale_threshold_counts_consecutive_breaches() {
        let cfg = config(1, 2);
        let mut state = ServiceState::default();

        assert_eq!(
            decide(-1, 4, 10.0, ServiceKind::Web, &cfg, &mut state),
            GateDecision::Hold
        );
        assert_eq!(state.downscale_sensitivity, 1);
        assert_eq!(
            decide(-1, 4, 10.0, ServiceKind::Web, &cfg, &mut state),
            GateDecision::Apply(4)
        );
        assert_eq!(state.downscale_sensitivity, 0);
    }

    #[test]
    fn opposite_breach_resets_the_other_counter() {
        let cfg = config(3, 3);
        let mut state = ServiceState::default();

        decide(1, 6, 10.0, ServiceKind::Web, &cfg, &mut state);
        decide(1, 6, 10.0, ServiceKind::Web, &cfg, &mut state);
        assert_eq!(state.upscale_sensitivity, 2);

        // A downward breach restarts the upscale streak.
        decide(-1, 4, 10.0, ServiceKind::Web, &cfg, &mut state);
        assert_eq!(state.upscale_sensitivity, 0);
        assert_eq!(state.downscale_sensitivity, 1);
    }

    #[test]
    fn no_breach_resets_both_counters() {
        let cfg = config(5, 5);
        let mut state = ServiceState {
            upscale_sensitivity: 3,
            downscale_sensitivity: 2,
            ..Default::default()
        };

        // Repeated diff == 0 always resets and NoOps, whatever the prior
        // counters were.
        for _ in 0..3 {
            let decision = decide(0, 5, 10.0, ServiceKind::Web, &cfg, &mut state);
            assert_eq!(decision, GateDecision::NoOp);
            assert_eq!(state.upscale_sensitivity, 0);
            assert_eq!(state.downscale_sensitivity, 0);
        }
    }

    #[test]
    fn worker_with_backlog_never_scales_down() {
        // decrementable=false, metric 10: downward diffs never apply, no
        // matter how long the streak.
        let cfg = config(1, 1);
        let mut state = ServiceState::default();
        for _ in 0..10 {
            let decision = decide(-2, 3, 10.0, ServiceKind::Worker, &cfg, &mut state);
            assert_eq!(decision, GateDecision::Hold);
        }
    }

    #[test]
    fn worker_with_zero_backlog_scales_down() {
        let cfg = config(1, 2);
        let mut state = ServiceState::default();
        assert_eq!(
            decide(-2, 0, 0.0, ServiceKind::Worker, &cfg, &mut state),
            GateDecision::Hold
        );
        assert_eq!(
            decide(-2, 0, 0.0, ServiceKind::Worker, &cfg, &mut state),
            GateDecision::Apply(0)
        );
    }

    #[test]
    fn decrementable_worker_scales_down_with_backlog() {
        let cfg = ServiceConfig {
            decrementable: true,
            ..config(1, 1)
        };
        let mut state = ServiceState::default();
        assert_eq!(
            decide(-1, 2, 10.0, ServiceKind::Worker, &cfg, &mut state),
            GateDecision::Apply(2)
        );
    }

    #[test]
    fn ineligible_downscale_leaves_counters_untouched() {
        // The documented asymmetry: the ineligible branch neither counts
        // the down-breach nor resets the up-streak.
        let cfg = config(3, 3);
        let mut state = ServiceState::default();

        decide(1, 6, 10.0, ServiceKind::Worker, &cfg, &mut state);
        decide(1, 6, 10.0, ServiceKind::Worker, &cfg, &mut state);
        assert_eq!(state.upscale_sensitivity, 2);

        decide(-1, 4, 10.0, ServiceKind::Worker, &cfg, &mut state);
        assert_eq!(state.upscale_sensitivity, 2, "up streak must survive");
        assert_eq!(state.downscale_sensitivity, 0);

        // The preserved streak completes on the next upward breach.
        let decision = decide(1, 6, 10.0, ServiceKind::Worker, &cfg, &mut state);
        assert_eq!(decision, GateDecision::Apply(6));
    }

    // ── plan: end-to-end policy → clamp → gate ─────────────────────

    fn web_config() -> ServiceConfig {
        ServiceConfig {
            min_response_time: Some(50.0),
            max_response_time: Some(100.0),
            upscale_quantity: 2,
            downscale_quantity: 3,
            upscale_sensitivity: 1,
            ..Default::default()
        }
    }

    #[test]
    fn plan_web_breach_applies_immediately_at_threshold_one() {
        let mut state = ServiceState::default();
        let decision = plan(ServiceKind::Web, 200.0, &web_config(), 5, &mut state).unwrap();
        assert_eq!(decision, GateDecision::Apply(7));
    }

    #[test]
    fn plan_web_downscale_clamps_to_min() {
        let cfg = ServiceConfig {
            min: 3,
            ..web_config()
        };
        let mut state = ServiceState::default();
        // Unclamped desired is 2 (5 - 3); min floors it at 3.
        let decision = plan(ServiceKind::Web, 30.0, &cfg, 5, &mut state).unwrap();
        assert_eq!(decision, GateDecision::Apply(3));
    }

    #[test]
    fn plan_web_idle_nan_is_noop() {
        let mut state = ServiceState {
            upscale_sensitivity: 2,
            ..Default::default()
        };
        let decision = plan(ServiceKind::Web, f64::NAN, &web_config(), 5, &mut state).unwrap();
        assert_eq!(decision, GateDecision::NoOp);
        assert_eq!(state.upscale_sensitivity, 0);
    }

    #[test]
    fn plan_worker_scales_to_backlog() {
        let cfg = ServiceConfig {
            ratio: Some(3.0),
            ..Default::default()
        };
        let mut state = ServiceState::default();
        let decision = plan(ServiceKind::Worker, 10.0, &cfg, 1, &mut state).unwrap();
        assert_eq!(decision, GateDecision::Apply(4));
    }

    #[test]
    fn plan_clamped_diff_of_zero_is_noop() {
        // Desired exceeds max, but current already sits at max: after the
        // clamp there is no breach at all.
        let cfg = ServiceConfig {
            max: Some(5),
            ..web_config()
        };
        let mut state = ServiceState::default();
        let decision = plan(ServiceKind::Web, 200.0, &cfg, 5, &mut state).unwrap();
        assert_eq!(decision, GateDecision::NoOp);
    }

    #[test]
    fn plan_propagates_policy_errors() {
        let mut state = ServiceState::default();
        let err = plan(
            ServiceKind::Worker,
            5.0,
            &ServiceConfig::default(),
            1,
            &mut state,
        )
        .unwrap_err();
        assert!(err.to_string().contains("ratio"));
    }
}
