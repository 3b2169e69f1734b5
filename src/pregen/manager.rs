//! At most one pre-generation run per world

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::walker::{PreGenRequest, PreGenStatus, PreGenerator};
use crate::core::{Result, WorldId};
use crate::generation::LodCoordinator;

struct Run {
    generator: Arc<PreGenerator>,
    task: JoinHandle<PreGenStatus>,
}

/// Starts, stops and reports pre-generation runs.
///
/// Starting a run for a world stops that world's current run; the new run
/// begins once the old one has drained its outstanding requests.
pub struct PreGenManager {
    coordinator: LodCoordinator,
    runs: Mutex<HashMap<WorldId, Run>>,
}

impl PreGenManager {
    pub fn new(coordinator: LodCoordinator) -> Self {
        Self {
            coordinator,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Start a run, replacing the world's current one. Requests reaching
    /// outside the world are refused and leave the current run alone.
    pub fn start(&self, request: PreGenRequest) -> Result<Arc<PreGenerator>> {
        request.validate()?;
        let config = self.coordinator.config().current();
        let generator = Arc::new(PreGenerator::new(
            self.coordinator.clone(),
            request,
            config.limits.pregen_max_in_flight,
            Duration::from_secs(config.limits.pregen_progress_interval_secs),
        ));

        let mut runs = self.runs();
        let previous = runs.remove(&request.world_id);
        if let Some(previous) = &previous {
            log::info!("Stopping running pre-generation of {} for a new run", request.world_id);
            previous.generator.stop();
        }

        let task = {
            let generator = generator.clone();
            tokio::spawn(async move {
                if let Some(previous) = previous {
                    let _ = previous.task.await;
                }
                generator.run().await
            })
        };
        runs.insert(
            request.world_id,
            Run {
                generator: generator.clone(),
                task,
            },
        );
        Ok(generator)
    }

    /// Signal the world's run to stop. Returns `false` if none is active.
    pub fn stop(&self, world_id: WorldId) -> bool {
        match self.runs().get(&world_id) {
            Some(run) if !run.task.is_finished() => {
                run.generator.stop();
                true
            }
            _ => false,
        }
    }

    /// Status of the world's latest run
    pub fn status(&self, world_id: WorldId) -> Option<PreGenStatus> {
        self.runs()
            .get(&world_id)
            .map(|run| run.generator.progress().snapshot())
    }

    pub fn is_running(&self, world_id: WorldId) -> bool {
        self.runs().get(&world_id).is_some_and(|run| !run.task.is_finished())
    }

    /// Stop every run, e.g. on shutdown
    pub fn stop_all(&self) {
        for run in self.runs().values() {
            run.generator.stop();
        }
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<WorldId, Run>> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuilderRegistry;
    use crate::config::{ConfigHandle, ServerConfig};
    use crate::storage::LodRepository;
    use crate::world::{SyntheticWorld, TokioScheduler, WorldInterface, WorldRegistry};

    fn manager() -> (PreGenManager, LodCoordinator, WorldId) {
        let world = Arc::new(SyntheticWorld::flat("overworld", 0, 16, &[("minecraft:stone", 4)]));
        let world_id = world.id();
        let worlds = Arc::new(WorldRegistry::new());
        worlds.register(world);
        let coordinator = LodCoordinator::new(
            LodRepository::temporary().unwrap(),
            Arc::new(TokioScheduler::current().unwrap()),
            worlds,
            Arc::new(ConfigHandle::new(ServerConfig::default(), BuilderRegistry::with_defaults()).unwrap()),
        );
        (PreGenManager::new(coordinator.clone()), coordinator, world_id)
    }

    fn request(world_id: WorldId, center_x: i32, radius: u32) -> PreGenRequest {
        PreGenRequest {
            world_id,
            center_x,
            center_z: 0,
            radius,
            force: false,
        }
    }

    async fn wait_idle(manager: &PreGenManager, world_id: WorldId) {
        for _ in 0..200 {
            if !manager.is_running(world_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("pre-generation did not finish");
    }

    #[tokio::test]
    async fn test_run_to_completion() {
        let (manager, _, world_id) = manager();
        assert!(manager.status(world_id).is_none());
        manager.start(request(world_id, 0, 1)).unwrap();
        wait_idle(&manager, world_id).await;

        let status = manager.status(world_id).unwrap();
        assert_eq!((status.completed, status.total), (4, 4));
        assert!(!manager.stop(world_id));
    }

    #[tokio::test]
    async fn test_new_run_replaces_old() {
        let (manager, coordinator, world_id) = manager();
        coordinator.pause();
        let first = manager.start(request(world_id, 0, 3)).unwrap();
        let second = manager.start(request(world_id, 100, 1)).unwrap();
        assert!(first.progress().is_stopping());
        assert!(!second.progress().is_stopping());

        coordinator.unpause();
        wait_idle(&manager, world_id).await;
        assert_eq!(manager.status(world_id).unwrap().completed, 4);
        assert!(first.progress().snapshot().issued < 36);
        assert!(coordinator.repository().exists(world_id, 100, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_stop() {
        let (manager, coordinator, world_id) = manager();
        coordinator.pause();
        manager.start(request(world_id, 0, 2)).unwrap();
        assert!(manager.stop(world_id));
        coordinator.unpause();
        wait_idle(&manager, world_id).await;
        assert!(manager.status(world_id).unwrap().issued < 16);
    }

    #[tokio::test]
    async fn test_out_of_range_start_is_refused() {
        let (manager, coordinator, world_id) = manager();
        coordinator.pause();
        let running = manager.start(request(world_id, 0, 2)).unwrap();

        assert!(manager.start(request(world_id, 200_000_000, 1)).is_err());
        assert!(!running.progress().is_stopping());
        assert!(manager.is_running(world_id));

        manager.stop(world_id);
        coordinator.unpause();
        wait_idle(&manager, world_id).await;
    }
}
