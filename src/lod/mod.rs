//! LOD data model: packed positions and runs, mapping tables, the LOD itself

pub mod beacon;
pub mod data_point;
pub mod id_mapping;
pub mod model;
pub mod section_position;

pub use beacon::Beacon;
pub use data_point::DataPoint;
pub use id_mapping::{IdMapping, IdMappingTable};
pub use model::{EncodedLod, LOD_WIDTH, Lod, decode_beacons, encode_beacons};
pub use section_position::{CHUNK_WIDTH, SECTION_DETAIL_LEVEL, SECTION_WIDTH, SectionPosition};

use crate::core::WorldId;

/// Cache identity of a section's LOD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionKey {
    pub world_id: WorldId,
    pub x: i32,
    pub z: i32,
}

impl SectionKey {
    pub fn new(world_id: WorldId, x: i32, z: i32) -> Self {
        Self { world_id, x, z }
    }

    pub fn from_position(world_id: WorldId, position: SectionPosition) -> Self {
        Self::new(world_id, position.x(), position.z())
    }

    pub fn position(&self) -> SectionPosition {
        SectionPosition::section(self.x, self.z)
    }
}
