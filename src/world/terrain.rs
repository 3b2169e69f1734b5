//! Noise-based procedural terrain for the synthetic world

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

/// Parameters controlling terrain generation
#[derive(Clone, Debug)]
pub struct TerrainParams {
    pub seed: u32,
    pub scale: f64,        // Horizontal scale (larger = smoother)
    pub base_height: i32,  // Height of a zero noise sample
    pub height_scale: f64, // Vertical amplitude in blocks
    pub octaves: usize,    // FBM octaves (detail levels)
    pub persistence: f64,  // FBM persistence (0.5 typical)
    pub lacunarity: f64,   // FBM lacunarity (2.0 typical)
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            scale: 400.0,
            base_height: 64,
            height_scale: 48.0,
            octaves: 5,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

/// Surface biome picked from temperature and height
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Biome {
    Ocean,
    Beach,
    Desert,
    Plains,
    Forest,
    Mountains,
    SnowyPeaks,
}

impl Biome {
    /// Namespaced biome name, as a host would report it
    pub fn name(&self) -> &'static str {
        match self {
            Biome::Ocean => "minecraft:ocean",
            Biome::Beach => "minecraft:beach",
            Biome::Desert => "minecraft:desert",
            Biome::Plains => "minecraft:plains",
            Biome::Forest => "minecraft:forest",
            Biome::Mountains => "minecraft:windswept_hills",
            Biome::SnowyPeaks => "minecraft:snowy_peaks",
        }
    }

    /// Top block of a column in this biome
    pub fn surface_material(&self) -> &'static str {
        match self {
            Biome::Ocean | Biome::Beach | Biome::Desert => "minecraft:sand",
            Biome::Plains | Biome::Forest => "minecraft:grass_block",
            Biome::Mountains => "minecraft:stone",
            Biome::SnowyPeaks => "minecraft:snow_block",
        }
    }

    /// Blocks just below the surface
    pub fn filler_material(&self) -> &'static str {
        match self {
            Biome::Ocean | Biome::Beach => "minecraft:sand",
            Biome::Desert => "minecraft:sandstone",
            Biome::Plains | Biome::Forest => "minecraft:dirt",
            Biome::Mountains | Biome::SnowyPeaks => "minecraft:stone",
        }
    }
}

/// Procedural height field using fractal Brownian motion (FBM)
pub struct NoiseTerrain {
    params: TerrainParams,
    height: Fbm<Perlin>,
    temperature: Perlin,
}

impl NoiseTerrain {
    pub fn new(params: TerrainParams) -> Self {
        let height = Fbm::<Perlin>::new(params.seed)
            .set_octaves(params.octaves)
            .set_persistence(params.persistence)
            .set_lacunarity(params.lacunarity);
        let temperature = Perlin::new(params.seed.wrapping_add(1));

        Self {
            params,
            height,
            temperature,
        }
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    /// Surface height at block column (x, z)
    pub fn height_at(&self, x: i32, z: i32) -> i32 {
        let nx = x as f64 / self.params.scale;
        let nz = z as f64 / self.params.scale;
        let sample = self.height.get([nx, nz]);
        self.params.base_height + (sample * self.params.height_scale).round() as i32
    }

    /// Biome at a column, given the world's sea level
    pub fn biome_at(&self, x: i32, z: i32, sea_level: i32) -> Biome {
        let height = self.height_at(x, z);
        let temperature = self
            .temperature
            .get([x as f64 / (self.params.scale * 2.0), z as f64 / (self.params.scale * 2.0)]);

        if height < sea_level - 1 {
            Biome::Ocean
        } else if height <= sea_level + 1 {
            Biome::Beach
        } else if height > sea_level + 40 {
            Biome::SnowyPeaks
        } else if height > sea_level + 24 {
            Biome::Mountains
        } else if temperature > 0.3 {
            Biome::Desert
        } else if temperature < -0.2 {
            Biome::Forest
        } else {
            Biome::Plains
        }
    }
}
