//! Cache-first LOD generation with single-flight deduplication
//!
//! A miss runs one pipeline per section key: recheck the cache, wait on the
//! pause gate, load the chunks the builder needs, build on the region's
//! thread, release the chunks, encode and persist. Concurrent callers for
//! the same key share that pipeline's future. The pipeline runs as its own
//! task so it completes even if every caller goes away.

use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::pause::PauseGate;
use crate::builder::LodBuilder;
use crate::config::ConfigHandle;
use crate::core::{Error, GenerationError, Result, WorldId};
use crate::lod::{SectionKey, SectionPosition};
use crate::storage::{LodModel, LodRepository};
use crate::world::scheduler::{self, Scheduler};
use crate::world::{WorldInterface, WorldRegistry};

/// Outcome shared by every waiter of one build
pub type GenerationResult = std::result::Result<Arc<LodModel>, GenerationError>;

type SharedGeneration = Shared<BoxFuture<'static, GenerationResult>>;

/// Cheap to clone; all clones share one cache, in-flight map and pause gate
#[derive(Clone)]
pub struct LodCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    repository: LodRepository,
    scheduler: Arc<dyn Scheduler>,
    worlds: Arc<WorldRegistry>,
    config: Arc<ConfigHandle>,
    in_flight: Mutex<HashMap<SectionKey, SharedGeneration>>,
    pause: PauseGate,
    builds: AtomicU64,
    failures: AtomicU64,
}

impl LodCoordinator {
    pub fn new(
        repository: LodRepository,
        scheduler: Arc<dyn Scheduler>,
        worlds: Arc<WorldRegistry>,
        config: Arc<ConfigHandle>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                repository,
                scheduler,
                worlds,
                config,
                in_flight: Mutex::new(HashMap::new()),
                pause: PauseGate::new(),
                builds: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        }
    }

    /// Cached LOD for a section, generating it on a miss
    pub async fn get_lod(&self, world_id: WorldId, position: SectionPosition) -> GenerationResult {
        match self.inner.repository.load(world_id, position.x(), position.z()).await {
            Ok(Some(model)) => return Ok(Arc::new(model)),
            Ok(None) => {}
            Err(e) => {
                log::error!("Cache read for {} in {} failed: {}", position, world_id, e);
                return Err(e.into());
            }
        }

        let world = self
            .inner
            .worlds
            .get(world_id)
            .ok_or_else(|| GenerationError::Internal(format!("unknown world {}", world_id)))?;
        let builder = self
            .inner
            .config
            .builder_for(world.name())
            .ok_or_else(|| GenerationError::Internal(format!("no builder configured for '{}'", world.name())))?;

        self.queue_builder(world, position, builder).await
    }

    /// Join the in-flight build for this section or start one
    pub async fn queue_builder(
        &self,
        world: Arc<dyn WorldInterface>,
        position: SectionPosition,
        builder: Arc<dyn LodBuilder>,
    ) -> GenerationResult {
        let key = SectionKey::from_position(world.id(), position);
        let generation = {
            let mut in_flight = self.inner.in_flight();
            match in_flight.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let generation = self.spawn_generation(key, world, position, builder);
                    in_flight.insert(key, generation.clone());
                    generation
                }
            }
        };
        generation.await
    }

    fn spawn_generation(
        &self,
        key: SectionKey,
        world: Arc<dyn WorldInterface>,
        position: SectionPosition,
        builder: Arc<dyn LodBuilder>,
    ) -> SharedGeneration {
        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let _guard = InFlightGuard {
                inner: inner.clone(),
                key,
            };
            inner.generate(world, position, builder).await
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(GenerationError::Internal(format!("generation task failed: {}", e))))
        }
        .boxed()
        .shared()
    }

    /// Rebuild a section from the world as it is now.
    ///
    /// A build already running for the section may have read the world
    /// before it changed, so it is awaited and its stored result replaced
    /// instead of being shared.
    pub async fn regenerate(&self, world_id: WorldId, position: SectionPosition) -> GenerationResult {
        let key = SectionKey::from_position(world_id, position);
        let running = self.inner.in_flight().get(&key).cloned();
        if let Some(running) = running {
            let _ = running.await;
        }
        self.invalidate(world_id, position.x(), position.z())
            .await
            .map_err(GenerationError::from)?;
        self.get_lod(world_id, position).await
    }

    /// Drop the cached LOD so the next request regenerates it
    pub async fn invalidate(&self, world_id: WorldId, x: i32, z: i32) -> Result<bool> {
        self.inner.repository.delete(world_id, x, z).await
    }

    /// Returns `false` if already paused
    pub fn pause(&self) -> bool {
        let changed = self.inner.pause.pause();
        if changed {
            log::info!("LOD generation paused");
        }
        changed
    }

    /// Returns `false` if not paused
    pub fn unpause(&self) -> bool {
        let changed = self.inner.pause.unpause();
        if changed {
            log::info!("LOD generation resumed");
        }
        changed
    }

    pub fn is_paused(&self) -> bool {
        self.inner.pause.is_paused()
    }

    /// Sections currently being generated
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight().len()
    }

    /// Successful builds since startup
    pub fn builds(&self) -> u64 {
        self.inner.builds.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.inner.failures.load(Ordering::Relaxed)
    }

    pub fn repository(&self) -> &LodRepository {
        &self.inner.repository
    }

    pub fn worlds(&self) -> &Arc<WorldRegistry> {
        &self.inner.worlds
    }

    pub fn config(&self) -> &Arc<ConfigHandle> {
        &self.inner.config
    }
}

/// Clears the in-flight entry when the pipeline task ends, including by panic
struct InFlightGuard {
    inner: Arc<Inner>,
    key: SectionKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight().remove(&self.key);
    }
}

impl Inner {
    fn in_flight(&self) -> MutexGuard<'_, HashMap<SectionKey, SharedGeneration>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn generate(
        &self,
        world: Arc<dyn WorldInterface>,
        position: SectionPosition,
        builder: Arc<dyn LodBuilder>,
    ) -> GenerationResult {
        match self.run_pipeline(world.clone(), position, builder).await {
            Ok(Outcome::Cached(model)) => Ok(Arc::new(model)),
            Ok(Outcome::Built(model)) => {
                self.builds.fetch_add(1, Ordering::Relaxed);
                Ok(Arc::new(model))
            }
            Err(Error::Generation(e @ GenerationError::ChunkLoadRejected { .. })) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("Generation of {} in '{}' aborted: {}", position, world.name(), e);
                Err(e)
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::error!("Generation of {} in '{}' failed: {}", position, world.name(), e);
                Err(e.into())
            }
        }
    }

    async fn run_pipeline(
        &self,
        world: Arc<dyn WorldInterface>,
        position: SectionPosition,
        builder: Arc<dyn LodBuilder>,
    ) -> Result<Outcome> {
        let (x, z) = (position.x(), position.z());

        // Another pipeline for this key may have finished since the caller's miss
        if let Some(model) = self.repository.load(world.id(), x, z).await? {
            return Ok(Outcome::Cached(model));
        }

        self.pause.wait().await;

        let world_config = self.config.world(world.name());
        let required = builder.required_chunks(position);
        let loaded = load_chunks(world.as_ref(), &required, world_config.generate_new_chunks).await?;

        let (anchor_x, anchor_z) = required.first().copied().unwrap_or((0, 0));
        let built = {
            let world = world.clone();
            scheduler::on_region_thread(self.scheduler.as_ref(), world.id(), anchor_x, anchor_z, move || {
                builder.generate(world.as_ref(), position)
            })
            .await
        };
        release_chunks(world.as_ref(), &loaded);

        let lod = built??;
        let encoded = lod.encode()?;
        let model = self
            .repository
            .save(world.id(), x, z, encoded.data, encoded.beacons)
            .await?;
        log::debug!(
            "Generated {} in '{}' ({} bytes, {} beacons)",
            position,
            world.name(),
            model.data.len(),
            lod.beacons().len()
        );
        Ok(Outcome::Built(model))
    }
}

enum Outcome {
    /// Stored by a pipeline that finished after the caller's miss
    Cached(LodModel),
    Built(LodModel),
}

/// Load every chunk in `required` that is not loaded yet. All or nothing:
/// if any load is refused or fails, the chunks loaded here are released.
async fn load_chunks(world: &dyn WorldInterface, required: &[(i32, i32)], generate: bool) -> Result<Vec<(i32, i32)>> {
    let missing: Vec<(i32, i32)> = required
        .iter()
        .copied()
        .filter(|&(cx, cz)| !world.is_chunk_loaded(cx, cz))
        .collect();
    let results = join_all(missing.iter().map(|&(cx, cz)| world.load_chunk(cx, cz, generate))).await;

    let mut loaded = Vec::with_capacity(missing.len());
    let mut failure = None;
    for (&chunk, result) in missing.iter().zip(results) {
        match result {
            Ok(true) => loaded.push(chunk),
            Ok(false) => {
                failure.get_or_insert(Error::Generation(GenerationError::ChunkLoadRejected {
                    chunk_x: chunk.0,
                    chunk_z: chunk.1,
                }));
            }
            Err(e) => {
                failure.get_or_insert(e);
            }
        }
    }

    match failure {
        Some(e) => {
            release_chunks(world, &loaded);
            Err(e)
        }
        None => Ok(loaded),
    }
}

fn release_chunks(world: &dyn WorldInterface, chunks: &[(i32, i32)]) {
    for &(cx, cz) in chunks {
        world.discard_chunk(cx, cz);
    }
}
