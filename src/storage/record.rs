//! Persisted LOD rows and their sled key/value encoding
//!
//! Keys are 24 bytes: the world uuid followed by the section x and z as
//! big-endian integers with the sign bit flipped, so that sled's byte order
//! matches numeric order within a world.

use rkyv::{Archive, Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{Error, Result, WorldId};
use crate::lod::model::aligned_copy;
use crate::lod::{Lod, SectionKey, SectionPosition};

pub const KEY_LEN: usize = 24;

/// Bumped whenever [`StoredLod`] changes shape
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// One cached LOD as stored and served
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LodModel {
    pub world_id: WorldId,
    pub x: i32,
    pub z: i32,
    /// Output of [`Lod::encode`]
    pub data: Vec<u8>,
    pub beacons: Vec<u8>,
    /// Milliseconds since the unix epoch when this row was written
    pub timestamp: i64,
}

impl LodModel {
    pub fn key(&self) -> SectionKey {
        SectionKey::new(self.world_id, self.x, self.z)
    }

    pub fn position(&self) -> SectionPosition {
        SectionPosition::section(self.x, self.z)
    }

    /// Decode the stored bytes back into a [`Lod`]
    pub fn to_lod(&self) -> Result<Lod> {
        Lod::decode(self.position(), &self.data, &self.beacons)
    }
}

#[derive(Archive, Serialize, Deserialize)]
struct StoredLod {
    format_version: u8,
    data: Vec<u8>,
    beacons: Vec<u8>,
    timestamp: i64,
}

pub fn encode_key(key: &SectionKey) -> [u8; KEY_LEN] {
    let mut bytes = [0; KEY_LEN];
    bytes[..16].copy_from_slice(key.world_id.as_bytes());
    bytes[16..20].copy_from_slice(&flip_sign(key.x).to_be_bytes());
    bytes[20..].copy_from_slice(&flip_sign(key.z).to_be_bytes());
    bytes
}

pub fn decode_key(bytes: &[u8]) -> Result<SectionKey> {
    if bytes.len() != KEY_LEN {
        return Err(Error::Storage(format!("LOD key has {} bytes, expected {}", bytes.len(), KEY_LEN)));
    }
    let world_id = Uuid::from_slice(&bytes[..16]).map_err(|e| Error::Storage(e.to_string()))?;
    let x = unflip_sign(u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]));
    let z = unflip_sign(u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]));
    Ok(SectionKey::new(world_id, x, z))
}

/// Key prefix shared by every row of a world
pub fn world_prefix(world_id: WorldId) -> [u8; 16] {
    *world_id.as_bytes()
}

pub fn encode_value(model: &LodModel) -> Result<Vec<u8>> {
    let stored = StoredLod {
        format_version: RECORD_FORMAT_VERSION,
        data: model.data.clone(),
        beacons: model.beacons.clone(),
        timestamp: model.timestamp,
    };
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&stored).map_err(|e| Error::Codec(e.to_string()))?;
    Ok(bytes.to_vec())
}

pub fn decode_value(key: &SectionKey, bytes: &[u8]) -> Result<LodModel> {
    let aligned = aligned_copy(bytes);
    let archived = rkyv::access::<ArchivedStoredLod, rkyv::rancor::Error>(aligned.as_slice())
        .map_err(|e| Error::Codec(e.to_string()))?;
    let stored: StoredLod =
        rkyv::deserialize::<StoredLod, rkyv::rancor::Error>(archived).map_err(|e| Error::Codec(e.to_string()))?;
    if stored.format_version != RECORD_FORMAT_VERSION {
        return Err(Error::Codec(format!(
            "unsupported record format version {}",
            stored.format_version
        )));
    }

    Ok(LodModel {
        world_id: key.world_id,
        x: key.x,
        z: key.z,
        data: stored.data,
        beacons: stored.beacons,
        timestamp: stored.timestamp,
    })
}

fn flip_sign(v: i32) -> u32 {
    (v as u32) ^ 0x8000_0000
}

fn unflip_sign(v: u32) -> i32 {
    (v ^ 0x8000_0000) as i32
}
