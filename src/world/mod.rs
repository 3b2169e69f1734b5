//! Host world access and scheduling ports
//!
//! The host game server owns worlds, chunks and threads. This module defines
//! the contracts the rest of the crate consumes; [`synthetic`] provides an
//! in-memory implementation for tests and the development server.

pub mod scheduler;
pub mod synthetic;
pub mod terrain;

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use farsight_protocol::BorderBounds;

use crate::core::{Result, WorldId};
use crate::lod::Beacon;

pub use scheduler::{Scheduler, Task, TokioScheduler};
pub use synthetic::SyntheticWorld;

/// Read access to one world plus control over its chunk lifecycle.
///
/// Block queries are called from the thread the [`Scheduler`] hands out for
/// the queried region; chunk loads are asynchronous.
pub trait WorldInterface: Send + Sync {
    fn id(&self) -> WorldId;

    fn name(&self) -> &str;

    /// Lowest block y, inclusive
    fn min_y(&self) -> i32;

    /// Top of the world, exclusive
    fn max_y(&self) -> i32;

    fn sea_level(&self) -> i32;

    /// Y of the highest motion-blocking block, or anything below
    /// [`min_y`](Self::min_y) for an empty column
    fn highest_solid_y(&self, x: i32, z: i32) -> i32;

    fn material_at(&self, x: i32, y: i32, z: i32) -> Result<String>;

    fn biome_at(&self, x: i32, y: i32, z: i32) -> Result<String>;

    /// Extra state that distinguishes otherwise identical materials
    fn block_state_at(&self, _x: i32, _y: i32, _z: i32) -> Option<String> {
        None
    }

    /// 0-15; positions above the world report full sky light
    fn sky_light_at(&self, x: i32, y: i32, z: i32) -> u8;

    /// 0-15
    fn block_light_at(&self, x: i32, y: i32, z: i32) -> u8;

    /// Beacons inside the inclusive block rectangle
    fn beacons_in(&self, _min_x: i32, _min_z: i32, _max_x: i32, _max_z: i32) -> Vec<Beacon> {
        Vec::new()
    }

    /// The world's own (vanilla) border, if it has one
    fn border(&self) -> Option<BorderBounds> {
        None
    }

    fn is_chunk_loaded(&self, chunk_x: i32, chunk_z: i32) -> bool;

    /// Load a chunk, generating it first when `generate` is set and it does
    /// not exist. Resolves to `false` when the host refuses.
    fn load_chunk(&self, chunk_x: i32, chunk_z: i32, generate: bool) -> BoxFuture<'static, Result<bool>>;

    /// Release a chunk loaded through [`load_chunk`](Self::load_chunk)
    fn discard_chunk(&self, chunk_x: i32, chunk_z: i32);
}

/// Worlds known to the server, by id
#[derive(Default)]
pub struct WorldRegistry {
    worlds: RwLock<HashMap<WorldId, Arc<dyn WorldInterface>>>,
}

impl WorldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, world: Arc<dyn WorldInterface>) {
        log::info!("Registered world '{}' ({})", world.name(), world.id());
        self.worlds
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(world.id(), world);
    }

    pub fn unregister(&self, id: WorldId) -> Option<Arc<dyn WorldInterface>> {
        self.worlds.write().unwrap_or_else(|e| e.into_inner()).remove(&id)
    }

    pub fn get(&self, id: WorldId) -> Option<Arc<dyn WorldInterface>> {
        self.worlds.read().unwrap_or_else(|e| e.into_inner()).get(&id).cloned()
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn WorldInterface>> {
        self.worlds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|w| w.name() == name)
            .cloned()
    }

    pub fn all(&self) -> Vec<Arc<dyn WorldInterface>> {
        let mut worlds: Vec<_> = self
            .worlds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        worlds.sort_by(|a, b| a.name().cmp(b.name()));
        worlds
    }
}
