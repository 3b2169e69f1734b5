//! Square spiral traversal of section offsets

/// +x, +z, -x, -z
const DIRECTIONS: [(i32, i32); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

/// Offsets from a center, spiraling outward.
///
/// The walk turns after every segment and the segment length grows by one
/// every second turn, so the first `k * k` offsets fill a `k x k` square.
#[derive(Debug, Clone)]
pub struct SpiralWalk {
    x: i32,
    z: i32,
    direction: usize,
    segment_len: u32,
    step: u32,
    turns: u32,
    remaining: u64,
}

impl SpiralWalk {
    /// Walk covering the `2R x 2R` square around the center
    pub fn new(radius: u32) -> Self {
        Self::with_count(Self::total(radius))
    }

    /// Walk yielding exactly `count` offsets
    pub fn with_count(count: u64) -> Self {
        Self {
            x: 0,
            z: 0,
            direction: 0,
            segment_len: 1,
            step: 0,
            turns: 0,
            remaining: count,
        }
    }

    /// Offsets visited for `radius`
    pub fn total(radius: u32) -> u64 {
        let side = 2 * radius as u64;
        side * side
    }
}

impl Iterator for SpiralWalk {
    type Item = (i32, i32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = (self.x, self.z);

        let (dx, dz) = DIRECTIONS[self.direction];
        self.x += dx;
        self.z += dz;
        self.step += 1;
        if self.step == self.segment_len {
            self.step = 0;
            self.direction = (self.direction + 1) % DIRECTIONS.len();
            self.turns += 1;
            if self.turns % 2 == 0 {
                self.segment_len += 1;
            }
        }

        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}
