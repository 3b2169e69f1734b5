//! Core type aliases

use std::time::{SystemTime, UNIX_EPOCH};

pub use uuid::Uuid;

/// Standard Result type for the crate
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;

/// Identifies a world (dimension) on the host server
pub type WorldId = Uuid;

/// Identifies a connected player
pub type PlayerId = Uuid;

/// Milliseconds since the unix epoch, used as LOD timestamps
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
