//! Deterministic in-memory world
//!
//! Columns come from fixed layers, per-column overrides, or the noise
//! terrain in [`super::terrain`]. Chunk loading is simulated with policies
//! for missing and refused chunks, and load/discard calls are counted.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

use farsight_protocol::BorderBounds;

use super::WorldInterface;
use super::terrain::{NoiseTerrain, TerrainParams};
use crate::core::{Result, WorldId};
use crate::lod::Beacon;

pub const AIR: &str = "minecraft:air";

/// Materials that do not stop a falling entity
const NON_SOLID: &[&str] = &[
    "minecraft:air",
    "minecraft:cave_air",
    "minecraft:void_air",
    "minecraft:water",
    "minecraft:lava",
    "minecraft:short_grass",
    "minecraft:tall_grass",
    "minecraft:torch",
    "minecraft:snow",
];

enum Columns {
    /// Materials bottom-up from `min_y`, air above
    Layers(Vec<String>),
    Noise(NoiseTerrain),
}

pub struct SyntheticWorld {
    id: WorldId,
    name: String,
    min_y: i32,
    max_y: i32,
    sea_level: i32,
    columns: Columns,
    overrides: HashMap<(i32, i32), Vec<String>>,
    biome: String,
    beacons: Vec<Beacon>,
    border: Option<BorderBounds>,
    /// Chunks that exist only if generation is allowed
    missing_chunks: HashSet<(i32, i32)>,
    /// Chunks the host always refuses to load
    refused_chunks: HashSet<(i32, i32)>,
    load_latency: Option<Duration>,
    loaded: Mutex<HashSet<(i32, i32)>>,
    loads: AtomicUsize,
    discards: AtomicUsize,
}

impl SyntheticWorld {
    fn with_columns(name: &str, min_y: i32, max_y: i32, columns: Columns) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            min_y,
            max_y,
            sea_level: 63,
            columns,
            overrides: HashMap::new(),
            biome: "minecraft:plains".into(),
            beacons: Vec::new(),
            border: None,
            missing_chunks: HashSet::new(),
            refused_chunks: HashSet::new(),
            load_latency: None,
            loaded: Mutex::new(HashSet::new()),
            loads: AtomicUsize::new(0),
            discards: AtomicUsize::new(0),
        }
    }

    /// Every column is the same stack of `(material, thickness)` layers,
    /// listed bottom-up from `min_y`
    pub fn flat(name: &str, min_y: i32, max_y: i32, layers: &[(&str, u32)]) -> Self {
        let stack = layers
            .iter()
            .flat_map(|&(material, count)| std::iter::repeat_n(material.to_string(), count as usize))
            .collect();
        Self::with_columns(name, min_y, max_y, Columns::Layers(stack))
    }

    /// Rolling noise terrain between y -64 and 320
    pub fn noise(name: &str, params: TerrainParams) -> Self {
        Self::with_columns(name, -64, 320, Columns::Noise(NoiseTerrain::new(params)))
    }

    pub fn with_id(mut self, id: WorldId) -> Self {
        self.id = id;
        self
    }

    pub fn with_sea_level(mut self, sea_level: i32) -> Self {
        self.sea_level = sea_level;
        self
    }

    /// Biome reported by layered columns
    pub fn with_biome(mut self, biome: &str) -> Self {
        self.biome = biome.to_string();
        self
    }

    /// Replace one column with materials listed bottom-up from `min_y`
    pub fn with_column(mut self, x: i32, z: i32, materials: &[&str]) -> Self {
        self.overrides
            .insert((x, z), materials.iter().map(|m| m.to_string()).collect());
        self
    }

    pub fn with_beacon(mut self, beacon: Beacon) -> Self {
        self.beacons.push(beacon);
        self
    }

    pub fn with_border(mut self, border: BorderBounds) -> Self {
        self.border = Some(border);
        self
    }

    pub fn with_missing_chunk(mut self, chunk_x: i32, chunk_z: i32) -> Self {
        self.missing_chunks.insert((chunk_x, chunk_z));
        self
    }

    pub fn with_refused_chunk(mut self, chunk_x: i32, chunk_z: i32) -> Self {
        self.refused_chunks.insert((chunk_x, chunk_z));
        self
    }

    pub fn with_load_latency(mut self, latency: Duration) -> Self {
        self.load_latency = Some(latency);
        self
    }

    /// Mark a chunk as already loaded by the host
    pub fn preload_chunk(&self, chunk_x: i32, chunk_z: i32) {
        self.loaded_set().insert((chunk_x, chunk_z));
    }

    /// Successful `load_chunk` calls so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// `discard_chunk` calls so far
    pub fn discard_count(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }

    /// Chunks currently loaded
    pub fn loaded_chunk_count(&self) -> usize {
        self.loaded_set().len()
    }

    fn loaded_set(&self) -> std::sync::MutexGuard<'_, HashSet<(i32, i32)>> {
        self.loaded.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_solid(material: &str) -> bool {
        !NON_SOLID.contains(&material)
    }

    fn material(&self, x: i32, y: i32, z: i32) -> String {
        if y < self.min_y || y >= self.max_y {
            return AIR.to_string();
        }
        let index = (y - self.min_y) as usize;
        if let Some(column) = self.overrides.get(&(x, z)) {
            return column.get(index).cloned().unwrap_or_else(|| AIR.to_string());
        }

        match &self.columns {
            Columns::Layers(stack) => stack.get(index).cloned().unwrap_or_else(|| AIR.to_string()),
            Columns::Noise(terrain) => {
                let height = terrain.height_at(x, z).clamp(self.min_y, self.max_y - 1);
                let biome = terrain.biome_at(x, z, self.sea_level);
                let material = if y == self.min_y {
                    "minecraft:bedrock"
                } else if y < height - 3 {
                    "minecraft:stone"
                } else if y < height {
                    biome.filler_material()
                } else if y == height {
                    biome.surface_material()
                } else if y <= self.sea_level {
                    "minecraft:water"
                } else {
                    AIR
                };
                material.to_string()
            }
        }
    }
}

impl WorldInterface for SyntheticWorld {
    fn id(&self) -> WorldId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn min_y(&self) -> i32 {
        self.min_y
    }

    fn max_y(&self) -> i32 {
        self.max_y
    }

    fn sea_level(&self) -> i32 {
        self.sea_level
    }

    fn highest_solid_y(&self, x: i32, z: i32) -> i32 {
        if !self.overrides.contains_key(&(x, z)) {
            if let Columns::Noise(terrain) = &self.columns {
                return terrain.height_at(x, z).clamp(self.min_y, self.max_y - 1);
            }
        }
        (self.min_y..self.max_y)
            .rev()
            .find(|&y| Self::is_solid(&self.material(x, y, z)))
            .unwrap_or(self.min_y - 1)
    }

    fn material_at(&self, x: i32, y: i32, z: i32) -> Result<String> {
        Ok(self.material(x, y, z))
    }

    fn biome_at(&self, x: i32, _y: i32, z: i32) -> Result<String> {
        Ok(match &self.columns {
            Columns::Noise(terrain) => terrain.biome_at(x, z, self.sea_level).name().to_string(),
            Columns::Layers(_) => self.biome.clone(),
        })
    }

    fn sky_light_at(&self, x: i32, y: i32, z: i32) -> u8 {
        if y > self.highest_solid_y(x, z) { 15 } else { 0 }
    }

    fn block_light_at(&self, x: i32, y: i32, z: i32) -> u8 {
        match self.material(x, y, z).as_str() {
            "minecraft:glowstone" | "minecraft:lava" => 15,
            "minecraft:torch" => 14,
            _ => 0,
        }
    }

    fn beacons_in(&self, min_x: i32, min_z: i32, max_x: i32, max_z: i32) -> Vec<Beacon> {
        self.beacons
            .iter()
            .filter(|b| (min_x..=max_x).contains(&b.x) && (min_z..=max_z).contains(&b.z))
            .copied()
            .collect()
    }

    fn border(&self) -> Option<BorderBounds> {
        self.border
    }

    fn is_chunk_loaded(&self, chunk_x: i32, chunk_z: i32) -> bool {
        self.loaded_set().contains(&(chunk_x, chunk_z))
    }

    fn load_chunk(&self, chunk_x: i32, chunk_z: i32, generate: bool) -> BoxFuture<'static, Result<bool>> {
        let key = (chunk_x, chunk_z);
        let accepted = !self.refused_chunks.contains(&key) && (generate || !self.missing_chunks.contains(&key));
        if accepted {
            self.loaded_set().insert(key);
            self.loads.fetch_add(1, Ordering::SeqCst);
        }

        match self.load_latency {
            Some(latency) => async move {
                tokio::time::sleep(latency).await;
                Ok(accepted)
            }
            .boxed(),
            None => futures::future::ready(Ok(accepted)).boxed(),
        }
    }

    fn discard_chunk(&self, chunk_x: i32, chunk_z: i32) {
        if self.loaded_set().remove(&(chunk_x, chunk_z)) {
            self.discards.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_layers() {
        let world = SyntheticWorld::flat("flat", 0, 8, &[("minecraft:bedrock", 1), ("minecraft:stone", 3)]);
        assert_eq!(world.material_at(0, 0, 0).unwrap(), "minecraft:bedrock");
        assert_eq!(world.material_at(5, 3, -5).unwrap(), "minecraft:stone");
        assert_eq!(world.material_at(5, 4, -5).unwrap(), AIR);
        assert_eq!(world.highest_solid_y(100, 100), 3);
        assert_eq!(world.sky_light_at(0, 4, 0), 15);
        assert_eq!(world.sky_light_at(0, 3, 0), 0);
    }

    #[test]
    fn test_column_override_and_void() {
        let world = SyntheticWorld::flat("flat", 0, 8, &[("minecraft:stone", 4)])
            .with_column(1, 1, &[])
            .with_column(2, 2, &["minecraft:stone", "minecraft:short_grass"]);
        assert_eq!(world.highest_solid_y(1, 1), -1);
        assert_eq!(world.highest_solid_y(2, 2), 0);
        assert_eq!(world.material_at(2, 1, 2).unwrap(), "minecraft:short_grass");
    }

    #[test]
    fn test_noise_column_shape() {
        let world = SyntheticWorld::noise("noise", TerrainParams::default());
        let top = world.highest_solid_y(10, 10);
        assert_eq!(world.material_at(10, -64, 10).unwrap(), "minecraft:bedrock");
        assert_eq!(world.material_at(10, top - 10, 10).unwrap(), "minecraft:stone");
        let above = world.material_at(10, top + 1, 10).unwrap();
        assert!(above == AIR || above == "minecraft:water");
    }

    #[tokio::test]
    async fn test_chunk_policies() {
        let world = SyntheticWorld::flat("flat", 0, 8, &[("minecraft:stone", 1)])
            .with_missing_chunk(1, 0)
            .with_refused_chunk(2, 0);

        assert!(world.load_chunk(0, 0, false).await.unwrap());
        assert!(!world.load_chunk(1, 0, false).await.unwrap());
        assert!(world.load_chunk(1, 0, true).await.unwrap());
        assert!(!world.load_chunk(2, 0, true).await.unwrap());
        assert_eq!(world.load_count(), 2);
        assert!(world.is_chunk_loaded(1, 0));

        world.discard_chunk(1, 0);
        world.discard_chunk(2, 0);
        assert_eq!(world.discard_count(), 1);
        assert_eq!(world.loaded_chunk_count(), 1);
    }

    #[test]
    fn test_beacon_filter() {
        let world = SyntheticWorld::flat("flat", 0, 8, &[])
            .with_beacon(Beacon::new(5, 3, 5, 0xFFFFFF))
            .with_beacon(Beacon::new(500, 3, 5, 0x00FF00));
        assert_eq!(world.beacons_in(0, 0, 63, 63).len(), 1);
    }
}
