//! Point features found while scanning

/// A beacon beam: block position plus packed RGB beam color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct Beacon {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// 0xRRGGBB
    pub color: u32,
}

impl Beacon {
    pub fn new(x: i32, y: i32, z: i32, color: u32) -> Self {
        Self { x, y, z, color }
    }
}
