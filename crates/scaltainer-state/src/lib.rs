//! scaltainer-state — domain types and persisted tick state.
//!
//! Holds the configuration document types (`ScalerConfig`, `ServiceConfig`),
//! the three-kind error taxonomy shared by every subsystem, and the
//! cross-tick runtime state (`GlobalState`) with its whole-document YAML
//! persistence.
//!
//! The state document round-trips through the same serialization as the
//! config document and is replaced wholesale once per tick, so a crash
//! mid-tick leaves it exactly as of the previous successful tick.

pub mod error;
pub mod store;
pub mod types;

pub use error::{ScaleError, ScaleResult};
pub use store::StateStore;
pub use types::*;
