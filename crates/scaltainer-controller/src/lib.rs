//! scaltainer-controller — the reconciliation loop.
//!
//! One `Controller` owns the loaded configuration, the persisted state,
//! and the process-wide clients. Each tick walks the web group then the
//! worker group, decides per service through the policy pipeline, applies
//! the surviving decisions, and persists state once at the end.

mod controller;

pub use controller::Controller;
