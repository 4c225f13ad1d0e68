//! scaltainer-policy — the pure decision core.
//!
//! Three stages per service per tick, all free of I/O:
//!
//! ```text
//! desired  = policy(metric, config, current)      // per service kind
//! adjusted = clamp(desired, config)               // into [min, max-or-∞]
//! decision = gate(adjusted - current, ...)        // hysteresis
//! ```
//!
//! The gate requires N consecutive same-direction breaches (the
//! sensitivity threshold) before a computed decision is actually applied,
//! so single-tick signal noise never moves replicas.

pub mod gate;
pub mod policy;

pub use gate::{GateDecision, decide, plan};
pub use policy::{clamp, desired_replicas};
