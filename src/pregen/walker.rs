//! One pre-generation run over a spiral of sections

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::spiral::SpiralWalk;
use crate::core::{Error, GenerationError, Result, WorldId};
use crate::generation::LodCoordinator;
use crate::lod::{SECTION_DETAIL_LEVEL, SectionPosition};

/// What to pre-generate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreGenRequest {
    pub world_id: WorldId,
    /// Center section
    pub center_x: i32,
    pub center_z: i32,
    /// Sections walked: the `2R x 2R` square around the center
    pub radius: u32,
    /// Discard cached LODs and regenerate them
    pub force: bool,
}

impl PreGenRequest {
    /// Check that every walked section lies inside the block coordinate range
    pub fn validate(&self) -> Result<()> {
        if self.radius == 0 {
            return Ok(());
        }
        // A 2R x 2R spiral spans offsets -(R - 1) ..= R
        let corners = i32::try_from(self.radius).ok().and_then(|r| {
            Some([
                (self.center_x.checked_sub(r - 1)?, self.center_z.checked_sub(r - 1)?),
                (self.center_x.checked_add(r)?, self.center_z.checked_add(r)?),
            ])
        });
        let in_range = corners.is_some_and(|corners| {
            corners.iter().all(|&(x, z)| {
                SectionPosition::checked(SECTION_DETAIL_LEVEL, x, z).is_some_and(|p| p.is_addressable())
            })
        });
        if in_range {
            Ok(())
        } else {
            Err(Error::InvalidRequest(format!(
                "radius {} around [{}, {}] leaves the world",
                self.radius, self.center_x, self.center_z
            )))
        }
    }

    fn section_at(&self, dx: i32, dz: i32) -> Option<SectionPosition> {
        let x = self.center_x.checked_add(dx)?;
        let z = self.center_z.checked_add(dz)?;
        SectionPosition::checked(SECTION_DETAIL_LEVEL, x, z).filter(|p| p.is_addressable())
    }
}

/// Counters shared between a run and anyone watching it
#[derive(Debug, Default)]
pub struct PreGenProgress {
    total: AtomicU64,
    issued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    running: AtomicBool,
    stop: AtomicBool,
}

/// Point-in-time copy of [`PreGenProgress`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreGenStatus {
    pub running: bool,
    pub total: u64,
    pub issued: u64,
    pub completed: u64,
    pub failed: u64,
}

impl PreGenProgress {
    pub fn snapshot(&self) -> PreGenStatus {
        PreGenStatus {
            running: self.running.load(Ordering::Acquire),
            total: self.total.load(Ordering::Relaxed),
            issued: self.issued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Walks sections outward from a center, keeping at most `max_in_flight`
/// LOD requests outstanding.
pub struct PreGenerator {
    coordinator: LodCoordinator,
    request: PreGenRequest,
    max_in_flight: usize,
    progress_interval: Duration,
    progress: Arc<PreGenProgress>,
}

impl PreGenerator {
    pub fn new(coordinator: LodCoordinator, request: PreGenRequest, max_in_flight: usize, progress_interval: Duration) -> Self {
        let progress = Arc::new(PreGenProgress::default());
        progress.total.store(SpiralWalk::total(request.radius), Ordering::Relaxed);
        Self {
            coordinator,
            request,
            max_in_flight: max_in_flight.max(1),
            progress_interval,
            progress,
        }
    }

    pub fn request(&self) -> &PreGenRequest {
        &self.request
    }

    pub fn progress(&self) -> &Arc<PreGenProgress> {
        &self.progress
    }

    /// Stop issuing requests; outstanding ones still finish
    pub fn stop(&self) {
        self.progress.stop.store(true, Ordering::Release);
    }

    pub async fn run(&self) -> PreGenStatus {
        let request = self.request;
        self.progress.running.store(true, Ordering::Release);
        let _running = RunningGuard(&self.progress);
        log::info!(
            "Pre-generation of {} started around [{}, {}] with radius {} ({} sections{})",
            request.world_id,
            request.center_x,
            request.center_z,
            request.radius,
            SpiralWalk::total(request.radius),
            if request.force { ", forced" } else { "" }
        );

        let mut in_flight: FuturesUnordered<BoxFuture<'_, std::result::Result<(), GenerationError>>> = FuturesUnordered::new();
        let mut last_report = Instant::now();

        for (dx, dz) in SpiralWalk::new(request.radius) {
            if self.progress.is_stopping() {
                break;
            }
            // Admission: wait for any outstanding request before issuing more
            while in_flight.len() >= self.max_in_flight {
                if let Some(result) = in_flight.next().await {
                    self.record(result);
                }
            }
            if self.progress.is_stopping() {
                break;
            }

            self.progress.issued.fetch_add(1, Ordering::Relaxed);
            let Some(position) = request.section_at(dx, dz) else {
                self.progress.failed.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            in_flight.push(self.generate(position).boxed());

            if last_report.elapsed() >= self.progress_interval {
                self.log_progress();
                last_report = Instant::now();
            }
        }

        while let Some(result) = in_flight.next().await {
            self.record(result);
        }

        drop(_running);
        let status = self.progress.snapshot();
        log::info!(
            "Pre-generation of {} {}: {} of {} sections done, {} failed",
            request.world_id,
            if self.progress.is_stopping() { "stopped" } else { "finished" },
            status.completed,
            status.total,
            status.failed
        );
        status
    }

    async fn generate(&self, position: SectionPosition) -> std::result::Result<(), GenerationError> {
        let world_id = self.request.world_id;
        if self.request.force {
            self.coordinator
                .invalidate(world_id, position.x(), position.z())
                .await
                .map_err(GenerationError::from)?;
        }
        self.coordinator.get_lod(world_id, position).await.map(|_| ())
    }

    fn record(&self, result: std::result::Result<(), GenerationError>) {
        match result {
            Ok(()) => self.progress.completed.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.progress.failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn log_progress(&self) {
        let status = self.progress.snapshot();
        let done = status.completed + status.failed;
        log::info!(
            "Pre-generation of {}: {}/{} sections ({:.1}%), {} failed",
            self.request.world_id,
            done,
            status.total,
            done as f64 * 100.0 / status.total.max(1) as f64,
            status.failed
        );
    }
}

/// Clears `running` when a run ends, including by panic
struct RunningGuard<'a>(&'a PreGenProgress);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuilderRegistry;
    use crate::config::{ConfigHandle, ServerConfig};
    use crate::storage::LodRepository;
    use crate::world::{SyntheticWorld, TokioScheduler, WorldInterface, WorldRegistry};

    fn coordinator() -> (LodCoordinator, Arc<SyntheticWorld>) {
        let world = Arc::new(SyntheticWorld::flat("overworld", 0, 16, &[("minecraft:stone", 4)]));
        let worlds = Arc::new(WorldRegistry::new());
        worlds.register(world.clone());
        let coordinator = LodCoordinator::new(
            LodRepository::temporary().unwrap(),
            Arc::new(TokioScheduler::current().unwrap()),
            worlds,
            Arc::new(ConfigHandle::new(ServerConfig::default(), BuilderRegistry::with_defaults()).unwrap()),
        );
        (coordinator, world)
    }

    fn request(world_id: WorldId, radius: u32, force: bool) -> PreGenRequest {
        PreGenRequest {
            world_id,
            center_x: 10,
            center_z: -10,
            radius,
            force,
        }
    }

    #[tokio::test]
    async fn test_radius_one_generates_four_sections() {
        let (coordinator, world) = coordinator();
        let generator = PreGenerator::new(coordinator.clone(), request(world.id(), 1, false), 8, Duration::from_secs(60));

        let status = generator.run().await;
        assert_eq!(status, PreGenStatus {
            running: false,
            total: 4,
            issued: 4,
            completed: 4,
            failed: 0,
        });
        assert_eq!(coordinator.builds(), 4);
        for (x, z) in [(10, -10), (11, -10), (11, -9), (10, -9)] {
            assert!(coordinator.repository().exists(world.id(), x, z).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_single_slot_still_finishes() {
        let (coordinator, world) = coordinator();
        let generator = PreGenerator::new(coordinator.clone(), request(world.id(), 2, false), 1, Duration::ZERO);
        let status = generator.run().await;
        assert_eq!(status.completed, 16);
        assert_eq!(coordinator.repository().count(world.id()).await.unwrap(), 16);
    }

    #[tokio::test]
    async fn test_force_regenerates_cached() {
        let (coordinator, world) = coordinator();
        coordinator
            .get_lod(world.id(), SectionPosition::section(10, -10))
            .await
            .unwrap();

        PreGenerator::new(coordinator.clone(), request(world.id(), 1, false), 4, Duration::from_secs(60))
            .run()
            .await;
        assert_eq!(coordinator.builds(), 4);

        PreGenerator::new(coordinator.clone(), request(world.id(), 1, true), 4, Duration::from_secs(60))
            .run()
            .await;
        assert_eq!(coordinator.builds(), 8);
    }

    #[tokio::test]
    async fn test_stop_between_steps() {
        let (coordinator, world) = coordinator();
        coordinator.pause();
        let generator = Arc::new(PreGenerator::new(
            coordinator.clone(),
            request(world.id(), 2, false),
            2,
            Duration::from_secs(60),
        ));

        let run = {
            let generator = generator.clone();
            tokio::spawn(async move { generator.run().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(generator.progress().snapshot().issued, 2);
        assert!(generator.progress().snapshot().running);

        generator.stop();
        coordinator.unpause();
        let status = run.await.unwrap();
        assert!(!status.running);
        assert_eq!(status.completed, 2);
        assert!(status.issued < status.total);
    }

    #[test]
    fn test_validate_rejects_out_of_range_centers() {
        let world_id = uuid::Uuid::new_v4();
        let request = |center_x: i32, radius: u32| PreGenRequest {
            world_id,
            center_x,
            center_z: 0,
            radius,
            force: false,
        };
        assert!(request(0, 1).validate().is_ok());
        assert!(request(-(1 << 25) + 1, 2).validate().is_ok());
        assert!(request((1 << 25) - 2, 1).validate().is_ok());
        assert!(request(200_000_000, 1).validate().is_err());
        assert!(request((1 << 25) - 1, 1).validate().is_err());
        assert!(request(i32::MAX, 1).validate().is_err());
        assert!(request(0, u32::MAX).validate().is_err());
        assert!(request(i32::MAX, 0).validate().is_ok());
    }

    #[tokio::test]
    async fn test_out_of_range_sections_fail_without_panic() {
        let (coordinator, world) = coordinator();
        let request = PreGenRequest {
            world_id: world.id(),
            center_x: 200_000_000,
            center_z: 0,
            radius: 1,
            force: false,
        };
        let generator = PreGenerator::new(coordinator.clone(), request, 2, Duration::from_secs(60));
        let status = generator.run().await;
        assert!(!status.running);
        assert_eq!(status.failed, 4);
        assert_eq!(coordinator.builds(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_counted() {
        let (coordinator, _world) = coordinator();
        let generator = PreGenerator::new(
            coordinator,
            request(uuid::Uuid::new_v4(), 1, false),
            2,
            Duration::from_secs(60),
        );
        let status = generator.run().await;
        assert_eq!(status.failed, 4);
        assert_eq!(status.completed, 0);
    }
}
