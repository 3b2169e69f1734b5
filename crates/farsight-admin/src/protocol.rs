//! Admin protocol - JSON command/response definitions

use serde::{Deserialize, Serialize};

/// Commands sent by an operator tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum AdminCommand {
    /// Health check
    Ping,
    /// Overall server state
    Status,
    /// Re-read the configuration file
    Reload,
    /// Halt new LOD generation until unpaused
    Pause,
    /// Resume LOD generation
    Unpause,
    /// Start pre-generating sections around a center (section coordinates).
    /// Replaces any pre-generation already running for that world.
    PreGenStart {
        world: String,
        center_x: i32,
        center_z: i32,
        radius: u32,
        #[serde(default)]
        force: bool,
    },
    /// Stop pre-generation for a world
    PreGenStop { world: String },
    /// Progress of the current or last pre-generation for a world
    PreGenStatus { world: String },
    /// Delete cached LODs outside an inclusive section box
    Trim {
        world: String,
        min_x: i32,
        min_z: i32,
        max_x: i32,
        max_z: i32,
    },
}

/// Responses from the admin server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum AdminResponse {
    #[serde(rename = "ok")]
    Ok { data: ResponseData },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Response data variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    None,
    Pong { message: String },
    Status {
        paused: bool,
        in_flight_generations: usize,
        sessions: usize,
        touched_sections: usize,
        worlds: Vec<WorldInfo>,
    },
    Reloaded { description: String },
    PauseChanged { paused: bool, changed: bool },
    PreGen(PreGenInfo),
    Trimmed { world: String, deleted: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldInfo {
    pub name: String,
    pub id: String,
    pub builder: String,
    pub pregen_running: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreGenInfo {
    pub world: String,
    pub running: bool,
    pub total: u64,
    pub issued: u64,
    pub completed: u64,
    pub failed: u64,
}

impl AdminResponse {
    pub fn ok(data: ResponseData) -> Self {
        Self::Ok { data }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error {
            message: msg.into(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(ResponseData::Pong {
            message: "pong".into(),
        })
    }

    pub fn none() -> Self {
        Self::ok(ResponseData::None)
    }
}
