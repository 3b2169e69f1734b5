//! Real-time updates: touched-section tracking and push distribution

pub mod distributor;
pub mod touched;

pub use distributor::{TickReport, UpdateDistributor};
pub use touched::TouchedSections;
