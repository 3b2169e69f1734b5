//! In-memory LOD artifact and its encoded form
//!
//! Encoded data is an rkyv archive of the mapping table and packed columns,
//! LZ4-compressed with a prepended size. Beacons are archived separately so
//! they can travel inline in response messages.

use rkyv::util::AlignedVec;

use super::beacon::Beacon;
use super::data_point::DataPoint;
use super::id_mapping::{IdMapping, IdMappingTable};
use super::section_position::{SECTION_WIDTH, SectionPosition};
use crate::core::{Error, Result};

/// Columns per side of a LOD
pub const LOD_WIDTH: usize = SECTION_WIDTH as usize;

/// Bumped whenever the archived layout changes
pub const LOD_FORMAT_VERSION: u8 = 1;

/// Simplified terrain for one section: a mapping table, one column of
/// [`DataPoint`]s (top to bottom) per (x, z) cell, and beacons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lod {
    position: SectionPosition,
    mappings: IdMappingTable,
    columns: Vec<Vec<DataPoint>>,
    beacons: Vec<Beacon>,
}

/// Byte form of a [`Lod`], as persisted and transmitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedLod {
    pub data: Vec<u8>,
    pub beacons: Vec<u8>,
}

#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
struct LodArchive {
    format_version: u8,
    width: u16,
    mappings: Vec<IdMapping>,
    /// Packed data points, `width * width` columns in row-major (z, x) order
    columns: Vec<Vec<u64>>,
}

#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
struct BeaconArchive {
    beacons: Vec<Beacon>,
}

impl Lod {
    /// Empty LOD with `LOD_WIDTH * LOD_WIDTH` empty columns
    pub fn new(position: SectionPosition) -> Self {
        Self {
            position,
            mappings: IdMappingTable::new(),
            columns: vec![Vec::new(); LOD_WIDTH * LOD_WIDTH],
            beacons: Vec::new(),
        }
    }

    pub fn position(&self) -> SectionPosition {
        self.position
    }

    pub fn mappings(&self) -> &IdMappingTable {
        &self.mappings
    }

    pub fn mappings_mut(&mut self) -> &mut IdMappingTable {
        &mut self.mappings
    }

    /// Column at local cell (x, z), both in `0..LOD_WIDTH`
    pub fn column(&self, x: usize, z: usize) -> &[DataPoint] {
        &self.columns[Self::index(x, z)]
    }

    pub fn set_column(&mut self, x: usize, z: usize, column: Vec<DataPoint>) {
        self.columns[Self::index(x, z)] = column;
    }

    pub fn columns(&self) -> &[Vec<DataPoint>] {
        &self.columns
    }

    pub fn beacons(&self) -> &[Beacon] {
        &self.beacons
    }

    pub fn add_beacon(&mut self, beacon: Beacon) {
        self.beacons.push(beacon);
    }

    /// Total data points across all columns
    pub fn point_count(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    fn index(x: usize, z: usize) -> usize {
        debug_assert!(x < LOD_WIDTH && z < LOD_WIDTH);
        z * LOD_WIDTH + x
    }

    /// Serialize and compress
    pub fn encode(&self) -> Result<EncodedLod> {
        let archive = LodArchive {
            format_version: LOD_FORMAT_VERSION,
            width: LOD_WIDTH as u16,
            mappings: self.mappings.entries().to_vec(),
            columns: self
                .columns
                .iter()
                .map(|column| column.iter().map(DataPoint::encode).collect())
                .collect(),
        };
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&archive)
            .map_err(|e| Error::Codec(e.to_string()))?;
        let data = lz4_flex::compress_prepend_size(&bytes);

        Ok(EncodedLod {
            data,
            beacons: encode_beacons(&self.beacons)?,
        })
    }

    /// Decompress and deserialize
    pub fn decode(position: SectionPosition, data: &[u8], beacons: &[u8]) -> Result<Self> {
        let decompressed = lz4_flex::decompress_size_prepended(data)
            .map_err(|e| Error::Codec(format!("LZ4 decompression failed: {}", e)))?;
        let aligned = aligned_copy(&decompressed);
        let archived = rkyv::access::<ArchivedLodArchive, rkyv::rancor::Error>(aligned.as_slice())
            .map_err(|e| Error::Codec(e.to_string()))?;
        let archive: LodArchive = rkyv::deserialize::<LodArchive, rkyv::rancor::Error>(archived)
            .map_err(|e| Error::Codec(e.to_string()))?;

        if archive.format_version != LOD_FORMAT_VERSION {
            return Err(Error::Codec(format!(
                "unsupported LOD format version {}",
                archive.format_version
            )));
        }
        let width = archive.width as usize;
        if width != LOD_WIDTH || archive.columns.len() != width * width {
            return Err(Error::Codec(format!(
                "LOD has {} columns, expected {}",
                archive.columns.len(),
                LOD_WIDTH * LOD_WIDTH
            )));
        }

        let mappings = IdMappingTable::from_entries(archive.mappings);
        let columns: Vec<Vec<DataPoint>> = archive
            .columns
            .into_iter()
            .map(|column| column.into_iter().map(DataPoint::decode).collect())
            .collect();
        if let Some(bad) = columns
            .iter()
            .flatten()
            .find(|point| point.mapping_id as usize >= mappings.len())
        {
            return Err(Error::Codec(format!("data point references unknown mapping {}", bad.mapping_id)));
        }

        Ok(Self {
            position,
            mappings,
            columns,
            beacons: decode_beacons(beacons)?,
        })
    }
}

/// Archive a beacon list
pub fn encode_beacons(beacons: &[Beacon]) -> Result<Vec<u8>> {
    let archive = BeaconArchive {
        beacons: beacons.to_vec(),
    };
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&archive).map_err(|e| Error::Codec(e.to_string()))?;
    Ok(bytes.to_vec())
}

/// Read back a beacon list written by [`encode_beacons`]
pub fn decode_beacons(bytes: &[u8]) -> Result<Vec<Beacon>> {
    let aligned = aligned_copy(bytes);
    let archived = rkyv::access::<ArchivedBeaconArchive, rkyv::rancor::Error>(aligned.as_slice())
        .map_err(|e| Error::Codec(e.to_string()))?;
    let archive: BeaconArchive = rkyv::deserialize::<BeaconArchive, rkyv::rancor::Error>(archived)
        .map_err(|e| Error::Codec(e.to_string()))?;
    Ok(archive.beacons)
}

/// rkyv validation needs the archive at its natural alignment
pub(crate) fn aligned_copy(bytes: &[u8]) -> AlignedVec {
    let mut aligned = AlignedVec::with_capacity(bytes.len());
    aligned.extend_from_slice(bytes);
    aligned
}
