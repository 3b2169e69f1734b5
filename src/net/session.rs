//! Per-player protocol state

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::mpsc;

use farsight_protocol::{FULL_DATA_CHUNK_SIZE, RemoteConfig, ServerMessage, split_into_chunks};

use crate::core::{PlayerId, WorldId};

#[derive(Debug, Clone, Default)]
struct SessionState {
    world: Option<WorldId>,
    /// Last reported block position
    position: Option<(i32, i32)>,
    /// Preferences sent by the client, if any
    client_config: Option<RemoteConfig>,
}

/// One connected player.
///
/// Outbound messages go through an unbounded channel drained by the
/// connection's writer task.
pub struct PlayerSession {
    player_id: PlayerId,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    next_buffer_id: AtomicU32,
    outstanding: AtomicU32,
    state: Mutex<SessionState>,
}

impl PlayerSession {
    pub fn new(player_id: PlayerId, outbound: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            player_id,
            outbound,
            next_buffer_id: AtomicU32::new(1),
            outstanding: AtomicU32::new(0),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Queue a message; `false` once the connection is gone
    pub fn send(&self, message: ServerMessage) -> bool {
        self.outbound.send(message).is_ok()
    }

    pub fn is_connected(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Monotonic per session, never 0
    pub fn next_buffer_id(&self) -> u32 {
        self.next_buffer_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send `data` as a run of [`FullDataChunk`](farsight_protocol::FullDataChunk)s
    /// under a fresh buffer id, which is returned
    pub fn send_buffer(&self, data: &[u8]) -> u32 {
        let buffer_id = self.next_buffer_id();
        for chunk in split_into_chunks(buffer_id, data, FULL_DATA_CHUNK_SIZE) {
            if !self.send(ServerMessage::FullDataChunk(chunk)) {
                break;
            }
        }
        buffer_id
    }

    pub fn world(&self) -> Option<WorldId> {
        self.state().world
    }

    pub fn set_world(&self, world: WorldId) {
        let mut state = self.state();
        if state.world != Some(world) {
            state.position = None;
        }
        state.world = Some(world);
    }

    pub fn position(&self) -> Option<(i32, i32)> {
        self.state().position
    }

    pub fn set_position(&self, block_x: i32, block_z: i32) {
        self.state().position = Some((block_x, block_z));
    }

    pub fn client_config(&self) -> Option<RemoteConfig> {
        self.state().client_config.clone()
    }

    pub fn set_client_config(&self, config: RemoteConfig) {
        self.state().client_config = Some(config);
    }

    /// Session config: the server's values merged with the client's
    /// preferences, or the server's values alone
    pub fn effective_config(&self, server: &RemoteConfig) -> RemoteConfig {
        match self.client_config() {
            Some(client) => RemoteConfig::merge(server, &client),
            None => server.clone(),
        }
    }

    /// Reserve one of `limit` outstanding request slots
    pub fn try_begin_request(self: &Arc<Self>, limit: u32) -> Option<RequestSlot> {
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .ok()?;
        Some(RequestSlot {
            session: self.clone(),
        })
    }

    pub fn outstanding_requests(&self) -> u32 {
        self.outstanding.load(Ordering::Acquire)
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Held while a request is being served; frees the slot on drop
pub struct RequestSlot {
    session: Arc<PlayerSession>,
}

impl Drop for RequestSlot {
    fn drop(&mut self) {
        self.session.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Connected players by id
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<PlayerId, Arc<PlayerSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<PlayerSession>) {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session.player_id(), session);
    }

    pub fn remove(&self, player_id: PlayerId) -> Option<Arc<PlayerSession>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner()).remove(&player_id)
    }

    pub fn get(&self, player_id: PlayerId) -> Option<Arc<PlayerSession>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&player_id)
            .cloned()
    }

    pub fn all(&self) -> Vec<Arc<PlayerSession>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Sessions currently in `world`
    pub fn in_world(&self, world: WorldId) -> Vec<Arc<PlayerSession>> {
        self.all().into_iter().filter(|s| s.world() == Some(world)).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
