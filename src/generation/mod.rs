//! Generation orchestration: cache lookups, single-flight builds, pausing

pub mod coordinator;
pub mod pause;

pub use coordinator::{GenerationResult, LodCoordinator};
pub use pause::PauseGate;
