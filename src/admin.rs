//! Admin command handling for the running server

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;

use farsight_admin::{AdminCommand, AdminHandler, AdminResponse, PreGenInfo, ResponseData, WorldInfo};

use crate::generation::LodCoordinator;
use crate::net::LodService;
use crate::pregen::{PreGenManager, PreGenRequest, PreGenStatus};
use crate::realtime::TouchedSections;
use crate::world::WorldInterface;

/// Executes [`AdminCommand`]s against the server's services
pub struct FarsightAdmin {
    service: Arc<LodService>,
    pregen: Arc<PreGenManager>,
    touched: Arc<TouchedSections>,
}

impl FarsightAdmin {
    pub fn new(service: Arc<LodService>, pregen: Arc<PreGenManager>, touched: Arc<TouchedSections>) -> Self {
        Self {
            service,
            pregen,
            touched,
        }
    }

    fn coordinator(&self) -> &LodCoordinator {
        self.service.coordinator()
    }

    fn world(&self, name: &str) -> Result<Arc<dyn WorldInterface>, AdminResponse> {
        self.coordinator()
            .worlds()
            .by_name(name)
            .ok_or_else(|| AdminResponse::error(format!("unknown world '{}'", name)))
    }

    async fn execute(&self, cmd: AdminCommand) -> AdminResponse {
        match cmd {
            AdminCommand::Ping => AdminResponse::pong(),

            AdminCommand::Status => {
                let coordinator = self.coordinator();
                let config = coordinator.config();
                let mut worlds: Vec<WorldInfo> = coordinator
                    .worlds()
                    .all()
                    .iter()
                    .map(|world| WorldInfo {
                        name: world.name().to_string(),
                        id: world.id().to_string(),
                        builder: config.world(world.name()).builder,
                        pregen_running: self.pregen.is_running(world.id()),
                    })
                    .collect();
                worlds.sort_by(|a, b| a.name.cmp(&b.name));

                AdminResponse::ok(ResponseData::Status {
                    paused: coordinator.is_paused(),
                    in_flight_generations: coordinator.in_flight_count(),
                    sessions: self.service.sessions().len(),
                    touched_sections: self.touched.len(),
                    worlds,
                })
            }

            AdminCommand::Reload => match self.coordinator().config().reload() {
                Ok(()) => {
                    let description = match self.coordinator().config().path() {
                        Some(path) => format!("reloaded {}", path.display()),
                        None => "reloaded".to_string(),
                    };
                    AdminResponse::ok(ResponseData::Reloaded { description })
                }
                Err(e) => {
                    log::warn!("Configuration reload failed, keeping the current one: {}", e);
                    AdminResponse::error(e.to_string())
                }
            },

            AdminCommand::Pause => {
                let changed = self.coordinator().pause();
                AdminResponse::ok(ResponseData::PauseChanged { paused: true, changed })
            }

            AdminCommand::Unpause => {
                let changed = self.coordinator().unpause();
                AdminResponse::ok(ResponseData::PauseChanged { paused: false, changed })
            }

            AdminCommand::PreGenStart {
                world,
                center_x,
                center_z,
                radius,
                force,
            } => {
                let target = match self.world(&world) {
                    Ok(target) => target,
                    Err(response) => return response,
                };
                let started = self.pregen.start(PreGenRequest {
                    world_id: target.id(),
                    center_x,
                    center_z,
                    radius,
                    force,
                });
                match started {
                    Ok(generator) => {
                        AdminResponse::ok(ResponseData::PreGen(pregen_info(world, generator.progress().snapshot())))
                    }
                    Err(e) => AdminResponse::error(e.to_string()),
                }
            }

            AdminCommand::PreGenStop { world } => {
                let target = match self.world(&world) {
                    Ok(target) => target,
                    Err(response) => return response,
                };
                if self.pregen.stop(target.id()) {
                    AdminResponse::none()
                } else {
                    AdminResponse::error(format!("no pre-generation running for '{}'", world))
                }
            }

            AdminCommand::PreGenStatus { world } => {
                let target = match self.world(&world) {
                    Ok(target) => target,
                    Err(response) => return response,
                };
                match self.pregen.status(target.id()) {
                    Some(status) => AdminResponse::ok(ResponseData::PreGen(pregen_info(world, status))),
                    None => AdminResponse::error(format!("no pre-generation has run for '{}'", world)),
                }
            }

            AdminCommand::Trim {
                world,
                min_x,
                min_z,
                max_x,
                max_z,
            } => {
                let target = match self.world(&world) {
                    Ok(target) => target,
                    Err(response) => return response,
                };
                if min_x > max_x || min_z > max_z {
                    return AdminResponse::error("trim box is empty");
                }
                match self
                    .coordinator()
                    .repository()
                    .trim(target.id(), min_x, min_z, max_x, max_z)
                    .await
                {
                    Ok(deleted) => AdminResponse::ok(ResponseData::Trimmed { world, deleted }),
                    Err(e) => AdminResponse::error(e.to_string()),
                }
            }
        }
    }
}

impl AdminHandler for FarsightAdmin {
    fn handle_command(&self, cmd: AdminCommand) -> BoxFuture<'_, AdminResponse> {
        self.execute(cmd).boxed()
    }
}

fn pregen_info(world: String, status: PreGenStatus) -> PreGenInfo {
    PreGenInfo {
        world,
        running: status.running,
        total: status.total,
        issued: status.issued,
        completed: status.completed,
        failed: status.failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuilderRegistry;
    use crate::config::{ConfigHandle, ServerConfig};
    use crate::lod::SectionPosition;
    use crate::storage::LodRepository;
    use crate::world::{SyntheticWorld, TokioScheduler, WorldRegistry};
    use std::time::Duration;

    fn admin() -> (FarsightAdmin, Arc<SyntheticWorld>) {
        let world = Arc::new(SyntheticWorld::flat("overworld", 0, 16, &[("minecraft:stone", 4)]));
        let worlds = Arc::new(WorldRegistry::new());
        worlds.register(world.clone());
        let coordinator = LodCoordinator::new(
            LodRepository::temporary().unwrap(),
            Arc::new(TokioScheduler::current().unwrap()),
            worlds,
            Arc::new(ConfigHandle::new(ServerConfig::default(), BuilderRegistry::with_defaults()).unwrap()),
        );
        let service = Arc::new(LodService::new(coordinator.clone()));
        let pregen = Arc::new(PreGenManager::new(coordinator));
        (FarsightAdmin::new(service, pregen, Arc::new(TouchedSections::new())), world)
    }

    #[tokio::test]
    async fn test_ping_and_status() {
        let (admin, _world) = admin();
        assert_eq!(admin.handle_command(AdminCommand::Ping).await, AdminResponse::pong());

        match admin.handle_command(AdminCommand::Status).await {
            AdminResponse::Ok {
                data: ResponseData::Status { paused, sessions, worlds, .. },
            } => {
                assert!(!paused);
                assert_eq!(sessions, 0);
                assert_eq!(worlds.len(), 1);
                assert_eq!(worlds[0].name, "overworld");
                assert_eq!(worlds[0].builder, "fast_overworld");
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pause_reports_change() {
        let (admin, _world) = admin();
        let paused = admin.handle_command(AdminCommand::Pause).await;
        assert_eq!(paused, AdminResponse::ok(ResponseData::PauseChanged { paused: true, changed: true }));
        let again = admin.handle_command(AdminCommand::Pause).await;
        assert_eq!(again, AdminResponse::ok(ResponseData::PauseChanged { paused: true, changed: false }));
        assert!(admin.coordinator().is_paused());

        admin.handle_command(AdminCommand::Unpause).await;
        assert!(!admin.coordinator().is_paused());
    }

    #[tokio::test]
    async fn test_reload_without_file_fails() {
        let (admin, _world) = admin();
        let response = admin.handle_command(AdminCommand::Reload).await;
        assert!(matches!(response, AdminResponse::Error { .. }));
    }

    #[tokio::test]
    async fn test_pregen_lifecycle() {
        let (admin, world) = admin();
        let start = AdminCommand::PreGenStart {
            world: "overworld".into(),
            center_x: 0,
            center_z: 0,
            radius: 1,
            force: false,
        };
        assert!(matches!(admin.handle_command(start).await, AdminResponse::Ok { .. }));

        for _ in 0..200 {
            if !admin.pregen.is_running(world.id()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let status = admin
            .handle_command(AdminCommand::PreGenStatus { world: "overworld".into() })
            .await;
        match status {
            AdminResponse::Ok {
                data: ResponseData::PreGen(info),
            } => {
                assert_eq!(info.completed, 4);
                assert!(!info.running);
            }
            other => panic!("unexpected response {:?}", other),
        }

        let stop = admin
            .handle_command(AdminCommand::PreGenStop { world: "overworld".into() })
            .await;
        assert!(matches!(stop, AdminResponse::Error { .. }));
    }

    #[tokio::test]
    async fn test_pregen_start_outside_world_is_an_error() {
        let (admin, world) = admin();
        let start = AdminCommand::PreGenStart {
            world: "overworld".into(),
            center_x: 200_000_000,
            center_z: 0,
            radius: 1,
            force: false,
        };
        match admin.handle_command(start).await {
            AdminResponse::Error { message } => assert!(message.contains("leaves the world")),
            other => panic!("unexpected response {:?}", other),
        }
        assert!(admin.pregen.status(world.id()).is_none());
    }

    #[tokio::test]
    async fn test_unknown_world() {
        let (admin, _world) = admin();
        let response = admin
            .handle_command(AdminCommand::PreGenStatus { world: "nether".into() })
            .await;
        assert_eq!(response, AdminResponse::error("unknown world 'nether'"));
    }

    #[tokio::test]
    async fn test_trim() {
        let (admin, world) = admin();
        let coordinator = admin.coordinator().clone();
        for (x, z) in [(0, 0), (1, 0), (5, 5)] {
            coordinator.get_lod(world.id(), SectionPosition::section(x, z)).await.unwrap();
        }

        let response = admin
            .handle_command(AdminCommand::Trim {
                world: "overworld".into(),
                min_x: 0,
                min_z: 0,
                max_x: 1,
                max_z: 1,
            })
            .await;
        assert_eq!(
            serde_json::to_value(&response).unwrap()["data"]["deleted"],
            serde_json::json!(1)
        );
        assert!(!coordinator.repository().exists(world.id(), 5, 5).await.unwrap());
        assert_eq!(coordinator.repository().count(world.id()).await.unwrap(), 2);
    }
}
