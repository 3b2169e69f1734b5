//! Deduplicating set of sections whose terrain changed

use std::collections::HashSet;
use std::sync::Mutex;

use crate::core::WorldId;
use crate::lod::{SECTION_WIDTH, SectionKey};

/// Sections touched since the last drain.
///
/// Touching a section several times before the next drain records it once.
/// [`take_touched`](Self::take_touched) swaps the set out under the lock, so
/// a touch racing with a drain lands in either this drain or the next.
#[derive(Debug, Default)]
pub struct TouchedSections {
    sections: Mutex<HashSet<SectionKey>>,
}

impl TouchedSections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the section was not already pending
    pub fn touch(&self, world_id: WorldId, x: i32, z: i32) -> bool {
        self.lock().insert(SectionKey::new(world_id, x, z))
    }

    /// Mark the section containing a changed block
    pub fn touch_block(&self, world_id: WorldId, block_x: i32, block_z: i32) -> bool {
        self.touch(
            world_id,
            block_x.div_euclid(SECTION_WIDTH),
            block_z.div_euclid(SECTION_WIDTH),
        )
    }

    /// Mark every section overlapping an inclusive block rectangle
    pub fn touch_region(&self, world_id: WorldId, min_x: i32, min_z: i32, max_x: i32, max_z: i32) {
        let mut sections = self.lock();
        for x in min_x.div_euclid(SECTION_WIDTH)..=max_x.div_euclid(SECTION_WIDTH) {
            for z in min_z.div_euclid(SECTION_WIDTH)..=max_z.div_euclid(SECTION_WIDTH) {
                sections.insert(SectionKey::new(world_id, x, z));
            }
        }
    }

    /// Take all pending sections and clear the set
    pub fn take_touched(&self) -> Vec<SectionKey> {
        let drained = std::mem::take(&mut *self.lock());
        let mut keys: Vec<_> = drained.into_iter().collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, world_id: WorldId, x: i32, z: i32) -> bool {
        self.lock().contains(&SectionKey::new(world_id, x, z))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<SectionKey>> {
        self.sections.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_touches_coalesce() {
        let touched = TouchedSections::new();
        let world = Uuid::new_v4();
        assert!(touched.touch(world, 1, 1));
        assert!(!touched.touch(world, 1, 1));
        assert!(!touched.touch_block(world, 70, 127));
        assert!(touched.touch_block(world, -1, 0));
        assert!(touched.contains(world, -1, 0));
        assert_eq!(touched.len(), 2);

        let drained = touched.take_touched();
        assert_eq!(drained.len(), 2);
        assert!(touched.is_empty());
        assert!(touched.touch(world, 1, 1));
    }

    #[test]
    fn test_region_spans_sections() {
        let touched = TouchedSections::new();
        let world = Uuid::new_v4();
        touched.touch_region(world, -10, 0, 70, 10);
        let keys: Vec<_> = touched.take_touched().iter().map(|k| (k.x, k.z)).collect();
        assert_eq!(keys, vec![(-1, 0), (0, 0), (1, 0)]);
    }
}
