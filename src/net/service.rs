//! Protocol handling for connected players
//!
//! Requests are checked in a fixed order (detail level, feature switch,
//! builder availability, world border, per-player rate limit) before the
//! coordinator is asked for the LOD. Every failure is answered with an
//! exception correlated to the request; none of them closes the connection.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use farsight_protocol::{ClientMessage, ExceptionReason, RemoteConfig, ServerMessage};

use super::session::{PlayerSession, SessionRegistry};
use crate::core::{Error, PlayerId, Result, WorldId};
use crate::generation::LodCoordinator;
use crate::lod::{CHUNK_WIDTH, SECTION_DETAIL_LEVEL, SectionPosition};
use crate::storage::LodModel;
use crate::world::WorldInterface;

/// A request that will not be served, and why
#[derive(Debug, Clone, PartialEq, Eq)]
struct Rejection {
    reason: ExceptionReason,
    message: String,
}

impl Rejection {
    fn new(reason: ExceptionReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self::new(ExceptionReason::RequestRejected, message)
    }
}

pub struct LodService {
    coordinator: LodCoordinator,
    sessions: SessionRegistry,
    /// Worlds already reported as lacking a builder
    warned_worlds: Mutex<HashSet<WorldId>>,
}

impl LodService {
    pub fn new(coordinator: LodCoordinator) -> Self {
        Self {
            coordinator,
            sessions: SessionRegistry::new(),
            warned_worlds: Mutex::new(HashSet::new()),
        }
    }

    pub fn coordinator(&self) -> &LodCoordinator {
        &self.coordinator
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Register a player; the receiver yields everything sent to them
    pub fn connect(&self, player_id: PlayerId) -> (Arc<PlayerSession>, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(PlayerSession::new(player_id, tx));
        self.sessions.insert(session.clone());
        log::debug!("Player {} connected", player_id);
        (session, rx)
    }

    pub fn disconnect(&self, player_id: PlayerId) {
        if self.sessions.remove(player_id).is_some() {
            log::debug!("Player {} disconnected", player_id);
        }
    }

    /// Host notification: the player is now in `world_id`
    pub fn set_player_world(&self, player_id: PlayerId, world_id: WorldId) -> Result<()> {
        let session = self
            .sessions
            .get(player_id)
            .ok_or_else(|| Error::World(format!("player {} is not connected", player_id)))?;
        let world = self
            .coordinator
            .worlds()
            .get(world_id)
            .ok_or_else(|| Error::World(format!("unknown world {}", world_id)))?;

        session.set_world(world_id);
        session.send(ServerMessage::LevelInit {
            world_id,
            world_name: world.name().to_string(),
        });
        session.send(ServerMessage::RemoteConfig(
            session.effective_config(&self.server_config(world.as_ref())),
        ));
        Ok(())
    }

    /// Host notification: the player moved to block (x, z)
    pub fn update_player_position(&self, player_id: PlayerId, block_x: i32, block_z: i32) {
        if let Some(session) = self.sessions.get(player_id) {
            session.set_position(block_x, block_z);
        }
    }

    pub async fn handle_message(&self, session: &Arc<PlayerSession>, message: ClientMessage) {
        match message {
            ClientMessage::RemoteConfig(client) => self.handle_remote_config(session, client),
            ClientMessage::FullDataRequest {
                request_id,
                section,
                client_timestamp,
            } => {
                self.handle_full_data_request(session, request_id, section, client_timestamp)
                    .await
            }
        }
    }

    fn handle_remote_config(&self, session: &Arc<PlayerSession>, client: RemoteConfig) {
        session.set_client_config(client);
        let server = match session.world().and_then(|id| self.coordinator.worlds().get(id)) {
            Some(world) => self.server_config(world.as_ref()),
            None => RemoteConfig::default(),
        };
        session.send(ServerMessage::RemoteConfig(session.effective_config(&server)));
    }

    async fn handle_full_data_request(
        &self,
        session: &Arc<PlayerSession>,
        request_id: u32,
        section: u64,
        client_timestamp: Option<i64>,
    ) {
        let reply = match self.serve_request(session, section, client_timestamp).await {
            Ok(Served::Current { timestamp }) => ServerMessage::FullDataResponse {
                request_id,
                buffer_id: None,
                beacons: Vec::new(),
                timestamp,
            },
            Ok(Served::Data(model)) => {
                let buffer_id = session.send_buffer(&model.data);
                ServerMessage::FullDataResponse {
                    request_id,
                    buffer_id: Some(buffer_id),
                    beacons: model.beacons.clone(),
                    timestamp: model.timestamp,
                }
            }
            Err(rejection) => {
                log::debug!(
                    "Request {} from {} rejected ({}): {}",
                    request_id,
                    session.player_id(),
                    rejection.reason,
                    rejection.message
                );
                ServerMessage::exception(request_id, rejection.reason, rejection.message)
            }
        };
        session.send(reply);
    }

    async fn serve_request(
        &self,
        session: &Arc<PlayerSession>,
        section: u64,
        client_timestamp: Option<i64>,
    ) -> std::result::Result<Served, Rejection> {
        let position = SectionPosition::decode(section);
        if position.detail_level() != SECTION_DETAIL_LEVEL {
            return Err(Rejection::new(
                ExceptionReason::SectionRequiresSplitting,
                format!("only detail level {} is served", SECTION_DETAIL_LEVEL),
            ));
        }
        if !position.is_addressable() {
            return Err(Rejection::rejected("section lies outside block coordinates"));
        }

        let world_id = session
            .world()
            .ok_or_else(|| Rejection::rejected("no world assigned"))?;
        let world = self
            .coordinator
            .worlds()
            .get(world_id)
            .ok_or_else(|| Rejection::rejected("world is not loaded"))?;
        let world_config = self.coordinator.config().world(world.name());
        let session_config = session.effective_config(&world_config.remote_config(world.as_ref()));
        if !session_config.distant_generation_enabled {
            return Err(Rejection::rejected("distant generation is disabled"));
        }

        if self.coordinator.config().builder_for(world.name()).is_none() {
            self.warn_no_builder(world.as_ref());
            return Err(Rejection::rejected("no LOD builder is available for this world"));
        }

        if let Some(border) = session_config.border {
            let (min_x, min_z) = position.min_block();
            let (max_x, max_z) = position.max_block();
            let margin = session_config.render_distance.saturating_mul(CHUNK_WIDTH as u32);
            if !border.intersects(min_x, min_z, max_x, max_z, margin) {
                return Err(Rejection::rejected("section is outside the world border"));
            }
        }

        let _slot = session
            .try_begin_request(session_config.max_requests_in_flight)
            .ok_or_else(|| Rejection::new(ExceptionReason::RateLimited, "too many outstanding requests"))?;

        let model = self
            .coordinator
            .get_lod(world_id, position)
            .await
            .map_err(|e| Rejection::rejected(e.to_string()))?;

        match client_timestamp {
            Some(held) if held >= model.timestamp => Ok(Served::Current {
                timestamp: model.timestamp,
            }),
            _ => Ok(Served::Data(model)),
        }
    }

    /// Push a regenerated LOD to one player
    pub fn deliver_update(&self, session: &PlayerSession, model: &LodModel) -> bool {
        let buffer_id = session.send_buffer(&model.data);
        session.send(ServerMessage::PartialUpdate {
            world_id: model.world_id,
            section: model.position().encode(),
            buffer_id,
            beacons: model.beacons.clone(),
            timestamp: model.timestamp,
        })
    }

    fn server_config(&self, world: &dyn WorldInterface) -> RemoteConfig {
        self.coordinator.config().world(world.name()).remote_config(world)
    }

    fn warn_no_builder(&self, world: &dyn WorldInterface) {
        let first = self
            .warned_worlds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(world.id());
        if first {
            log::warn!("No LOD builder configured for world '{}', rejecting requests", world.name());
        }
    }
}

enum Served {
    /// The client already holds this version
    Current { timestamp: i64 },
    Data(Arc<LodModel>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuilderRegistry;
    use crate::config::{BorderMode, ConfigHandle, ServerConfig};
    use crate::storage::LodRepository;
    use crate::world::{SyntheticWorld, TokioScheduler, WorldRegistry};
    use farsight_protocol::ChunkAssembler;
    use uuid::Uuid;

    fn service_with(config: ServerConfig) -> (Arc<LodService>, Arc<SyntheticWorld>) {
        let world = Arc::new(SyntheticWorld::flat("overworld", 0, 32, &[("minecraft:stone", 8)]));
        let worlds = Arc::new(WorldRegistry::new());
        worlds.register(world.clone());
        let coordinator = LodCoordinator::new(
            LodRepository::temporary().unwrap(),
            Arc::new(TokioScheduler::current().unwrap()),
            worlds,
            Arc::new(ConfigHandle::new(config, BuilderRegistry::with_defaults()).unwrap()),
        );
        (Arc::new(LodService::new(coordinator)), world)
    }

    fn joined(
        service: &LodService,
        world: &SyntheticWorld,
    ) -> (Arc<PlayerSession>, mpsc::UnboundedReceiver<ServerMessage>) {
        let player = Uuid::new_v4();
        let (session, mut rx) = service.connect(player);
        service.set_player_world(player, world.id()).unwrap();
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::LevelInit { .. })));
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::RemoteConfig(_))));
        (session, rx)
    }

    fn request(request_id: u32, position: SectionPosition, client_timestamp: Option<i64>) -> ClientMessage {
        ClientMessage::FullDataRequest {
            request_id,
            section: position.encode(),
            client_timestamp,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn exception_reason(messages: &[ServerMessage]) -> Option<(u32, ExceptionReason)> {
        match messages {
            [ServerMessage::Exception { request_id, reason, .. }] => Some((*request_id, *reason)),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_wrong_detail_level_requires_splitting() {
        let (service, world) = service_with(ServerConfig::default());
        let (session, mut rx) = joined(&service, &world);

        service
            .handle_message(&session, request(7, SectionPosition::new(5, 0, 0), None))
            .await;
        assert_eq!(
            exception_reason(&drain(&mut rx)),
            Some((7, ExceptionReason::SectionRequiresSplitting))
        );
        assert_eq!(service.coordinator().in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_full_data_is_chunked_then_answered() {
        let (service, world) = service_with(ServerConfig::default());
        let (session, mut rx) = joined(&service, &world);
        let position = SectionPosition::section(0, 1);

        service.handle_message(&session, request(1, position, None)).await;
        let messages = drain(&mut rx);

        let mut assembler = ChunkAssembler::new();
        let (last, chunks) = messages.split_last().unwrap();
        for message in chunks {
            match message {
                ServerMessage::FullDataChunk(chunk) => assembler.accept(chunk.clone()),
                other => panic!("unexpected {:?}", other),
            }
        }
        let ServerMessage::FullDataResponse {
            request_id,
            buffer_id: Some(buffer_id),
            timestamp,
            ..
        } = last
        else {
            panic!("expected a data response, got {:?}", last);
        };
        assert_eq!(*request_id, 1);
        let data = assembler.take(*buffer_id).unwrap();
        let model = service
            .coordinator()
            .repository()
            .load(world.id(), 0, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data, model.data);
        assert_eq!(*timestamp, model.timestamp);
        assert_eq!(session.outstanding_requests(), 0);
    }

    #[tokio::test]
    async fn test_current_client_copy_skips_transfer() {
        let (service, world) = service_with(ServerConfig::default());
        let (session, mut rx) = joined(&service, &world);
        let position = SectionPosition::section(0, 0);
        service.handle_message(&session, request(1, position, None)).await;
        drain(&mut rx);

        service
            .handle_message(&session, request(2, position, Some(i64::MAX)))
            .await;
        let messages = drain(&mut rx);
        assert!(matches!(
            messages.as_slice(),
            [ServerMessage::FullDataResponse { request_id: 2, buffer_id: None, .. }]
        ));
    }

    #[tokio::test]
    async fn test_disabled_world_rejected() {
        let config = ServerConfig::from_toml_str("[worlds.overworld]\nenabled = false").unwrap();
        let (service, world) = service_with(config);
        let (session, mut rx) = joined(&service, &world);

        service
            .handle_message(&session, request(3, SectionPosition::section(0, 0), None))
            .await;
        assert_eq!(
            exception_reason(&drain(&mut rx)),
            Some((3, ExceptionReason::RequestRejected))
        );
    }

    #[tokio::test]
    async fn test_client_can_opt_out() {
        let (service, world) = service_with(ServerConfig::default());
        let (session, mut rx) = joined(&service, &world);
        let prefs = RemoteConfig {
            distant_generation_enabled: false,
            ..RemoteConfig::default()
        };
        service.handle_message(&session, ClientMessage::RemoteConfig(prefs)).await;
        match rx.try_recv() {
            Ok(ServerMessage::RemoteConfig(merged)) => assert!(!merged.distant_generation_enabled),
            other => panic!("expected merged config, got {:?}", other),
        }

        service
            .handle_message(&session, request(4, SectionPosition::section(0, 0), None))
            .await;
        assert_eq!(
            exception_reason(&drain(&mut rx)),
            Some((4, ExceptionReason::RequestRejected))
        );
    }

    #[tokio::test]
    async fn test_missing_builder_rejected() {
        let config = ServerConfig::from_toml_str("[generation]\nbuilder = \"none\"").unwrap();
        let (service, world) = service_with(config);
        let (session, mut rx) = joined(&service, &world);

        for request_id in 0..2 {
            service
                .handle_message(&session, request(request_id, SectionPosition::section(0, 0), None))
                .await;
            assert_eq!(
                exception_reason(&drain(&mut rx)),
                Some((request_id, ExceptionReason::RequestRejected))
            );
        }
        assert_eq!(service.warned_worlds.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_border_with_render_distance_margin() {
        let mut config = ServerConfig::default();
        config.render_distance = 4;
        config.border = BorderMode::Custom {
            center_x: 0,
            center_z: 0,
            radius: 100,
        };
        let (service, world) = service_with(config);
        let (session, mut rx) = joined(&service, &world);

        // Border reaches block 100, plus a 64 block margin
        service
            .handle_message(&session, request(1, SectionPosition::section(2, 0), None))
            .await;
        assert!(matches!(
            drain(&mut rx).last(),
            Some(ServerMessage::FullDataResponse { request_id: 1, .. })
        ));

        service
            .handle_message(&session, request(2, SectionPosition::section(3, 0), None))
            .await;
        assert_eq!(
            exception_reason(&drain(&mut rx)),
            Some((2, ExceptionReason::RequestRejected))
        );
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let mut config = ServerConfig::default();
        config.limits.max_requests_per_player = 1;
        let (service, world) = service_with(config);
        let (session, mut rx) = joined(&service, &world);

        let _held = session.try_begin_request(1).unwrap();
        service
            .handle_message(&session, request(9, SectionPosition::section(0, 0), None))
            .await;
        assert_eq!(
            exception_reason(&drain(&mut rx)),
            Some((9, ExceptionReason::RateLimited))
        );
    }

    #[tokio::test]
    async fn test_section_beyond_block_range_rejected() {
        let (service, world) = service_with(ServerConfig::default());
        let (session, mut rx) = joined(&service, &world);

        service
            .handle_message(&session, request(11, SectionPosition::section(1 << 25, 0), None))
            .await;
        assert_eq!(
            exception_reason(&drain(&mut rx)),
            Some((11, ExceptionReason::RequestRejected))
        );
        assert_eq!(world.load_count(), 0);
        assert_eq!(service.coordinator().builds(), 0);
    }

    #[tokio::test]
    async fn test_request_without_world() {
        let (service, _world) = service_with(ServerConfig::default());
        let (session, mut rx) = service.connect(Uuid::new_v4());
        service
            .handle_message(&session, request(5, SectionPosition::section(0, 0), None))
            .await;
        assert_eq!(
            exception_reason(&drain(&mut rx)),
            Some((5, ExceptionReason::RequestRejected))
        );
    }

    #[tokio::test]
    async fn test_deliver_update() {
        let (service, world) = service_with(ServerConfig::default());
        let (session, mut rx) = joined(&service, &world);
        let model = service
            .coordinator()
            .get_lod(world.id(), SectionPosition::section(1, 1))
            .await
            .unwrap();

        assert!(service.deliver_update(&session, &model));
        let messages = drain(&mut rx);
        assert!(matches!(
            messages.last(),
            Some(ServerMessage::PartialUpdate { section, .. }) if *section == SectionPosition::section(1, 1).encode()
        ));
    }
}
