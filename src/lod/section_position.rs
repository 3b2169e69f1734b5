//! Bit-packed section positions
//!
//! Layout of the 64-bit word (least significant bit first):
//!
//! | bits   | field        | encoding                       |
//! |--------|--------------|--------------------------------|
//! | 0..8   | detail level | unsigned                       |
//! | 8..36  | x            | 28-bit two's complement        |
//! | 36..64 | z            | 28-bit two's complement        |

use std::fmt;

/// The only detail level this server generates (64 block wide sections)
pub const SECTION_DETAIL_LEVEL: u8 = 6;

/// Width in blocks of a section at [`SECTION_DETAIL_LEVEL`]
pub const SECTION_WIDTH: i32 = 1 << SECTION_DETAIL_LEVEL;

/// Width in blocks of a host chunk
pub const CHUNK_WIDTH: i32 = 16;

const DETAIL_LEVEL_WIDTH: u32 = 8;
const X_WIDTH: u32 = 28;
const Z_WIDTH: u32 = 28;

const DETAIL_LEVEL_OFFSET: u32 = 0;
const X_OFFSET: u32 = DETAIL_LEVEL_OFFSET + DETAIL_LEVEL_WIDTH;
const Z_OFFSET: u32 = X_OFFSET + X_WIDTH;

const DETAIL_LEVEL_MASK: u64 = (1 << DETAIL_LEVEL_WIDTH) - 1;
const X_MASK: u64 = (1 << X_WIDTH) - 1;
const Z_MASK: u64 = (1 << Z_WIDTH) - 1;

/// Smallest representable x/z section coordinate
pub const MIN_SECTION_COORD: i32 = -(1 << (X_WIDTH - 1));
/// Largest representable x/z section coordinate
pub const MAX_SECTION_COORD: i32 = (1 << (X_WIDTH - 1)) - 1;

/// A square region of terrain at a given detail level.
///
/// At detail level `d` a section is `2^d` blocks wide and `x`/`z` count
/// sections, not blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionPosition {
    detail_level: u8,
    x: i32,
    z: i32,
}

impl SectionPosition {
    /// Create a position; coordinates must fit in 28 signed bits
    pub fn new(detail_level: u8, x: i32, z: i32) -> Self {
        debug_assert!((MIN_SECTION_COORD..=MAX_SECTION_COORD).contains(&x), "section x {} out of range", x);
        debug_assert!((MIN_SECTION_COORD..=MAX_SECTION_COORD).contains(&z), "section z {} out of range", z);
        Self { detail_level, x, z }
    }

    /// Like [`SectionPosition::new`], returning `None` for out-of-range coordinates
    pub fn checked(detail_level: u8, x: i32, z: i32) -> Option<Self> {
        let range = MIN_SECTION_COORD..=MAX_SECTION_COORD;
        (range.contains(&x) && range.contains(&z)).then_some(Self { detail_level, x, z })
    }

    /// Section at the server's fixed detail level
    pub fn section(x: i32, z: i32) -> Self {
        Self::new(SECTION_DETAIL_LEVEL, x, z)
    }

    /// Section containing a block column
    pub fn containing_block(block_x: i32, block_z: i32) -> Self {
        Self::section(block_x.div_euclid(SECTION_WIDTH), block_z.div_euclid(SECTION_WIDTH))
    }

    pub fn detail_level(&self) -> u8 {
        self.detail_level
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn z(&self) -> i32 {
        self.z
    }

    /// Pack into the 64-bit wire representation
    pub fn encode(&self) -> u64 {
        ((self.detail_level as u64 & DETAIL_LEVEL_MASK) << DETAIL_LEVEL_OFFSET)
            | ((self.x as u64 & X_MASK) << X_OFFSET)
            | ((self.z as u64 & Z_MASK) << Z_OFFSET)
    }

    /// Unpack a 64-bit word, sign-extending x and z
    pub fn decode(packed: u64) -> Self {
        let detail_level = ((packed >> DETAIL_LEVEL_OFFSET) & DETAIL_LEVEL_MASK) as u8;
        let x = (((packed << (64 - X_OFFSET - X_WIDTH)) as i64) >> (64 - X_WIDTH)) as i32;
        let z = (((packed << (64 - Z_OFFSET - Z_WIDTH)) as i64) >> (64 - Z_WIDTH)) as i32;
        Self { detail_level, x, z }
    }

    /// Width of this section in blocks
    pub fn block_width(&self) -> i32 {
        1 << self.detail_level.min(30)
    }

    /// Minimum corner block (x, z); wraps for sections that are not
    /// [addressable](Self::is_addressable)
    pub fn min_block(&self) -> (i32, i32) {
        let width = self.block_width();
        (self.x.wrapping_mul(width), self.z.wrapping_mul(width))
    }

    /// Minimum corner block, `None` when it does not fit in block coordinates
    pub fn checked_min_block(&self) -> Option<(i32, i32)> {
        let width = self.block_width();
        Some((self.x.checked_mul(width)?, self.z.checked_mul(width)?))
    }

    /// Whether every block of the section has an `i32` coordinate
    pub fn is_addressable(&self) -> bool {
        self.checked_min_block().is_some()
    }

    /// Maximum corner block (x, z), inclusive
    pub fn max_block(&self) -> (i32, i32) {
        let (min_x, min_z) = self.min_block();
        let width = self.block_width();
        (min_x + width - 1, min_z + width - 1)
    }

    /// Host chunks covered by this section, row by row
    pub fn chunks(&self) -> impl Iterator<Item = (i32, i32)> + use<> {
        let (min_x, min_z) = self.min_block();
        let min_cx = min_x.div_euclid(CHUNK_WIDTH);
        let min_cz = min_z.div_euclid(CHUNK_WIDTH);
        let count = (self.block_width() / CHUNK_WIDTH).max(1);
        (0..count).flat_map(move |dz| (0..count).map(move |dx| (min_cx + dx, min_cz + dz)))
    }

    /// Chebyshev distance in sections
    pub fn distance_to(&self, other: &SectionPosition) -> u32 {
        let dx = (self.x as i64 - other.x as i64).unsigned_abs();
        let dz = (self.z as i64 - other.z as i64).unsigned_abs();
        dx.max(dz) as u32
    }
}

impl fmt::Display for SectionPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.detail_level, self.x, self.z)
    }
}
