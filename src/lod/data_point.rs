//! Bit-packed vertical runs
//!
//! | bits   | field        | encoding                 |
//! |--------|--------------|--------------------------|
//! | 0..32  | mapping id   | unsigned                 |
//! | 32..44 | height       | unsigned, blocks         |
//! | 44..56 | start y      | 12-bit two's complement  |
//! | 56..60 | sky light    | unsigned, 0-15           |
//! | 60..64 | block light  | unsigned, 0-15           |

const ID_WIDTH: u32 = 32;
const HEIGHT_WIDTH: u32 = 12;
const START_Y_WIDTH: u32 = 12;
const SKY_LIGHT_WIDTH: u32 = 4;
const BLOCK_LIGHT_WIDTH: u32 = 4;

const ID_OFFSET: u32 = 0;
const HEIGHT_OFFSET: u32 = ID_OFFSET + ID_WIDTH;
const START_Y_OFFSET: u32 = HEIGHT_OFFSET + HEIGHT_WIDTH;
const SKY_LIGHT_OFFSET: u32 = START_Y_OFFSET + START_Y_WIDTH;
const BLOCK_LIGHT_OFFSET: u32 = SKY_LIGHT_OFFSET + SKY_LIGHT_WIDTH;

const ID_MASK: u64 = (1 << ID_WIDTH) - 1;
const HEIGHT_MASK: u64 = (1 << HEIGHT_WIDTH) - 1;
const START_Y_MASK: u64 = (1 << START_Y_WIDTH) - 1;
const SKY_LIGHT_MASK: u64 = (1 << SKY_LIGHT_WIDTH) - 1;
const BLOCK_LIGHT_MASK: u64 = (1 << BLOCK_LIGHT_WIDTH) - 1;

/// Tallest run a single data point can describe
pub const MAX_HEIGHT: u16 = HEIGHT_MASK as u16;
/// Lowest encodable start y
pub const MIN_START_Y: i16 = -(1 << (START_Y_WIDTH - 1));
/// Highest encodable start y
pub const MAX_START_Y: i16 = (1 << (START_Y_WIDTH - 1)) - 1;
/// Brightest light level
pub const MAX_LIGHT: u8 = 15;

/// One vertical run of identical (biome, material) within a column.
///
/// Covers blocks `start_y .. start_y + height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataPoint {
    pub mapping_id: u32,
    pub height: u16,
    pub start_y: i16,
    pub sky_light: u8,
    pub block_light: u8,
}

impl DataPoint {
    pub fn new(mapping_id: u32, height: u16, start_y: i16, sky_light: u8, block_light: u8) -> Self {
        debug_assert!(height <= MAX_HEIGHT);
        debug_assert!((MIN_START_Y..=MAX_START_Y).contains(&start_y));
        debug_assert!(sky_light <= MAX_LIGHT && block_light <= MAX_LIGHT);
        Self {
            mapping_id,
            height,
            start_y,
            sky_light,
            block_light,
        }
    }

    /// First block above this run
    pub fn top_y(&self) -> i32 {
        self.start_y as i32 + self.height as i32
    }

    pub fn encode(&self) -> u64 {
        ((self.mapping_id as u64 & ID_MASK) << ID_OFFSET)
            | ((self.height as u64 & HEIGHT_MASK) << HEIGHT_OFFSET)
            | ((self.start_y as u64 & START_Y_MASK) << START_Y_OFFSET)
            | ((self.sky_light as u64 & SKY_LIGHT_MASK) << SKY_LIGHT_OFFSET)
            | ((self.block_light as u64 & BLOCK_LIGHT_MASK) << BLOCK_LIGHT_OFFSET)
    }

    pub fn decode(packed: u64) -> Self {
        let start_y =
            (((packed << (64 - START_Y_OFFSET - START_Y_WIDTH)) as i64) >> (64 - START_Y_WIDTH)) as i16;
        Self {
            mapping_id: ((packed >> ID_OFFSET) & ID_MASK) as u32,
            height: ((packed >> HEIGHT_OFFSET) & HEIGHT_MASK) as u16,
            start_y,
            sky_light: ((packed >> SKY_LIGHT_OFFSET) & SKY_LIGHT_MASK) as u8,
            block_light: ((packed >> BLOCK_LIGHT_OFFSET) & BLOCK_LIGHT_MASK) as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_boundaries() {
        let ids = [0u32, 1, 4096, u32::MAX];
        let heights = [0u16, 1, 384, MAX_HEIGHT];
        let start_ys = [MIN_START_Y, -64, -1, 0, 1, 319, MAX_START_Y];
        for &mapping_id in &ids {
            for &height in &heights {
                for &start_y in &start_ys {
                    for &(sky, block) in &[(0u8, 0u8), (15, 0), (0, 15), (15, 15), (7, 9)] {
                        let point = DataPoint::new(mapping_id, height, start_y, sky, block);
                        assert_eq!(DataPoint::decode(point.encode()), point);
                    }
                }
            }
        }
    }

    #[test]
    fn test_negative_start_y_sign_extends() {
        let point = DataPoint::new(3, 10, -64, 15, 0);
        let packed = point.encode();
        assert_eq!((packed >> START_Y_OFFSET) & START_Y_MASK, 0xFC0);
        assert_eq!(DataPoint::decode(packed).start_y, -64);
        assert_eq!(DataPoint::decode(packed).top_y(), -54);
    }

    #[test]
    fn test_fields_do_not_overlap() {
        let packed = DataPoint::new(u32::MAX, 0, 0, 0, 0).encode();
        assert_eq!(packed, 0xFFFF_FFFF);
        let packed = DataPoint::new(0, 0, 0, 0, 15).encode();
        assert_eq!(packed, 0xF000_0000_0000_0000);
        let packed = DataPoint::new(0, MAX_HEIGHT, 0, 0, 0).encode();
        assert_eq!(packed, 0x0000_0FFF_0000_0000);
    }
}
