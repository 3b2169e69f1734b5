//! Column-scanning builder for surface-dominated worlds
//!
//! Each cell of the section is described top-down: one air run above the
//! surface, then batches of `y_step` blocks down to a ground cutoff a few
//! blocks under the first natural ground at or below sea level. Adjacent
//! batches with the same mapping merge into one run.

use std::sync::Arc;

use super::predicate::{MaterialPredicate, MaterialSet};
use super::{BuilderSettings, LodBuilder};
use crate::core::Result;
use crate::lod::{DataPoint, IdMapping, LOD_WIDTH, Lod, SectionPosition, data_point};
use crate::world::WorldInterface;

/// Blocks kept below the first ground sample
const GROUND_DEPTH: i32 = 10;

pub struct FastOverworldBuilder {
    settings: BuilderSettings,
    ground: Arc<dyn MaterialPredicate>,
    air: Arc<dyn MaterialPredicate>,
}

impl FastOverworldBuilder {
    pub fn new(settings: BuilderSettings) -> Self {
        Self {
            settings,
            ground: Arc::new(MaterialSet::ground()),
            air: Arc::new(MaterialSet::air()),
        }
    }

    /// Replace the ground classification (e.g. for modded terrain)
    pub fn with_ground(mut self, ground: Arc<dyn MaterialPredicate>) -> Self {
        self.ground = ground;
        self
    }

    pub fn with_air(mut self, air: Arc<dyn MaterialPredicate>) -> Self {
        self.air = air;
        self
    }

    pub fn settings(&self) -> &BuilderSettings {
        &self.settings
    }

    fn scan_column(&self, world: &dyn WorldInterface, lod: &mut Lod, x: i32, z: i32) -> Result<Vec<DataPoint>> {
        let min_y = world.min_y();
        let max_y = world.max_y();
        let sea_level = world.sea_level();
        let mut base_step = self.settings.y_step.max(1) as i32;

        let mut top = world.highest_solid_y(x, z);
        if top < min_y {
            // Void: a single air run down to the bottom of the world
            let mut column = Vec::new();
            let mut run = ColumnRun::new(&mut column);
            let id = mapping_for(world, lod, x, max_y - 1, z)?;
            run.push(world, id, x, z, min_y, max_y - 1);
            return Ok(column);
        }

        if self.settings.include_non_colliding_top_layer {
            while top + 1 < max_y && !self.air.matches(&world.material_at(x, top + 1, z)?) {
                top += 1;
                base_step = 1;
            }
        }

        let mut column = Vec::new();
        let mut run = ColumnRun::new(&mut column);

        if top + 1 < max_y {
            // Sampled at the top of the world so the run reads as open sky
            let id = mapping_for(world, lod, x, max_y - 1, z)?;
            run.push(world, id, x, z, top + 1, max_y - 1);
        }

        let mut cutoff = min_y;
        let mut ground_found = false;
        let mut step = base_step;
        let mut y = top;
        while y >= cutoff {
            let material = world.material_at(x, y, z)?;
            let is_air = self.air.matches(&material);

            if is_air && step > 1 {
                // Air under a solid block: walk the gap block by block
                step = 1;
            } else if !is_air && step != base_step {
                step = base_step;
            }

            if !ground_found && self.ground.matches(&material) && (y <= sea_level || self.settings.scan_to_sea_level) {
                ground_found = true;
                let relative = y - min_y;
                let sea_relative = sea_level - min_y;
                cutoff = (min_y + (relative - GROUND_DEPTH).min(sea_relative - GROUND_DEPTH)).max(min_y);
            }

            let bottom = (y - step + 1).max(cutoff);
            let biome = world.biome_at(x, y, z)?;
            let extra = world.block_state_at(x, y, z);
            let id = lod.mappings_mut().get_or_insert(IdMapping::new(biome, material, extra));
            run.push(world, id, x, z, bottom, y);

            y = bottom - 1;
        }

        Ok(column)
    }
}

impl LodBuilder for FastOverworldBuilder {
    fn name(&self) -> &str {
        "fast_overworld"
    }

    fn generate(&self, world: &dyn WorldInterface, position: SectionPosition) -> Result<Lod> {
        let mut lod = Lod::new(position);
        let (min_x, min_z) = position.min_block();

        for cell_z in 0..LOD_WIDTH {
            for cell_x in 0..LOD_WIDTH {
                let x = min_x + cell_x as i32;
                let z = min_z + cell_z as i32;
                let column = self.scan_column(world, &mut lod, x, z)?;
                lod.set_column(cell_x, cell_z, column);
            }
        }

        let (max_x, max_z) = position.max_block();
        for beacon in world.beacons_in(min_x, min_z, max_x, max_z) {
            lod.add_beacon(beacon);
        }

        log::debug!(
            "Built {} for {} with {} points and {} mappings",
            position,
            world.name(),
            lod.point_count(),
            lod.mappings().len()
        );
        Ok(lod)
    }
}

fn mapping_for(world: &dyn WorldInterface, lod: &mut Lod, x: i32, y: i32, z: i32) -> Result<u32> {
    let biome = world.biome_at(x, y, z)?;
    let material = world.material_at(x, y, z)?;
    let extra = world.block_state_at(x, y, z);
    Ok(lod.mappings_mut().get_or_insert(IdMapping::new(biome, material, extra)))
}

/// Appends blocks to a column from the top down, merging equal mappings
struct ColumnRun<'a> {
    column: &'a mut Vec<DataPoint>,
}

impl<'a> ColumnRun<'a> {
    fn new(column: &'a mut Vec<DataPoint>) -> Self {
        Self { column }
    }

    /// Add blocks `bottom..=top`, which must lie directly under the last run
    fn push(&mut self, world: &dyn WorldInterface, id: u32, x: i32, z: i32, bottom: i32, top: i32) {
        let bottom = bottom.max(data_point::MIN_START_Y as i32);
        let top = top.min(data_point::MAX_START_Y as i32 + data_point::MAX_HEIGHT as i32 - 1);
        if top < bottom {
            return;
        }
        let count = top - bottom + 1;

        if let Some(last) = self.column.last_mut() {
            let merged = last.height as i32 + count;
            if last.mapping_id == id && last.start_y as i32 == top + 1 && merged <= data_point::MAX_HEIGHT as i32 {
                last.start_y = bottom as i16;
                last.height = merged as u16;
                return;
            }
        }

        let sky_light = world.sky_light_at(x, top + 1, z).min(data_point::MAX_LIGHT);
        let block_light = world.block_light_at(x, top + 1, z).min(data_point::MAX_LIGHT);
        self.column.push(DataPoint::new(
            id,
            count.min(data_point::MAX_HEIGHT as i32) as u16,
            bottom as i16,
            sky_light,
            block_light,
        ));
    }
}
