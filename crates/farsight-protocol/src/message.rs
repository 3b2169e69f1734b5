//! Message definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Typed reason carried by an [`ServerMessage::Exception`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExceptionReason {
    /// The request is valid but the server will not serve it
    RequestRejected,
    /// Requested section is coarser than the server's fixed detail level
    SectionRequiresSplitting,
    /// The session already has too many outstanding requests
    RateLimited,
}

impl ExceptionReason {
    /// Stable upper-case code, as shown to operators and client logs
    pub fn code(&self) -> &'static str {
        match self {
            ExceptionReason::RequestRejected => "REQUEST_REJECTED",
            ExceptionReason::SectionRequiresSplitting => "SECTION_REQUIRES_SPLITTING",
            ExceptionReason::RateLimited => "RATE_LIMITED",
        }
    }
}

impl fmt::Display for ExceptionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Square world border in block coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderBounds {
    pub center_x: i32,
    pub center_z: i32,
    /// Half the side length, in blocks
    pub radius: u32,
}

impl BorderBounds {
    /// Whether the block rectangle `[min_x, max_x] x [min_z, max_z]` overlaps
    /// this border after growing it by `margin` blocks on every side.
    pub fn intersects(&self, min_x: i32, min_z: i32, max_x: i32, max_z: i32, margin: u32) -> bool {
        let reach = self.radius as i64 + margin as i64;
        let (cx, cz) = (self.center_x as i64, self.center_z as i64);
        (max_x as i64) >= cx - reach
            && (min_x as i64) <= cx + reach
            && (max_z as i64) >= cz - reach
            && (min_z as i64) <= cz + reach
    }
}

/// Feature switches and limits negotiated between client and server.
///
/// The client sends its preferences; the server answers with the merged
/// result (see [`RemoteConfig::merge`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub distant_generation_enabled: bool,
    pub real_time_updates_enabled: bool,
    /// Render distance in chunks
    pub render_distance: u32,
    /// Outstanding full-data requests allowed per session
    pub max_requests_in_flight: u32,
    /// Real-time update radius in sections
    pub update_radius: u32,
    /// Always the server's value, clients may send `None`
    pub border: Option<BorderBounds>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            distant_generation_enabled: true,
            real_time_updates_enabled: true,
            render_distance: 256,
            max_requests_in_flight: 32,
            update_radius: 8,
            border: None,
        }
    }
}

impl RemoteConfig {
    /// Merge server and client values: booleans AND together, integers take
    /// the minimum, and the world border always comes from the server.
    pub fn merge(server: &RemoteConfig, client: &RemoteConfig) -> RemoteConfig {
        RemoteConfig {
            distant_generation_enabled: server.distant_generation_enabled
                && client.distant_generation_enabled,
            real_time_updates_enabled: server.real_time_updates_enabled
                && client.real_time_updates_enabled,
            render_distance: server.render_distance.min(client.render_distance),
            max_requests_in_flight: server.max_requests_in_flight.min(client.max_requests_in_flight),
            update_radius: server.update_radius.min(client.update_radius),
            border: server.border,
        }
    }
}

/// One slice of a larger buffer, reassembled by `buffer_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullDataChunk {
    pub buffer_id: u32,
    /// Set on the first slice; the receiver starts a fresh buffer
    pub is_first: bool,
    pub payload: Vec<u8>,
}

/// Messages sent by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Client preferences, answered with the merged config
    RemoteConfig(RemoteConfig),
    /// Ask for the LOD of one section in the client's current world
    FullDataRequest {
        request_id: u32,
        /// Packed section position
        section: u64,
        /// Timestamp of the copy the client already holds, if any
        client_timestamp: Option<i64>,
    },
}

/// Messages sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Merged configuration for this session
    RemoteConfig(RemoteConfig),
    /// The player entered a world; subsequent requests target it
    LevelInit { world_id: Uuid, world_name: String },
    /// Slice of an encoded LOD
    FullDataChunk(FullDataChunk),
    /// Answer to a [`ClientMessage::FullDataRequest`].
    ///
    /// `buffer_id` is `None` when the client copy is already current.
    FullDataResponse {
        request_id: u32,
        buffer_id: Option<u32>,
        beacons: Vec<u8>,
        timestamp: i64,
    },
    /// Unsolicited refresh of a section after terrain changed
    PartialUpdate {
        world_id: Uuid,
        section: u64,
        buffer_id: u32,
        beacons: Vec<u8>,
        timestamp: i64,
    },
    /// A request failed; the connection stays open
    Exception {
        request_id: u32,
        reason: ExceptionReason,
        message: String,
    },
    /// The server is about to close the channel
    CloseReason { reason: String },
}

impl ServerMessage {
    pub fn exception(request_id: u32, reason: ExceptionReason, message: impl Into<String>) -> Self {
        Self::Exception {
            request_id,
            reason,
            message: message.into(),
        }
    }

    pub fn close(reason: impl Into<String>) -> Self {
        Self::CloseReason {
            reason: reason.into(),
        }
    }

    /// Correlation id, for messages that answer a request
    pub fn request_id(&self) -> Option<u32> {
        match self {
            ServerMessage::FullDataResponse { request_id, .. }
            | ServerMessage::Exception { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }
}
