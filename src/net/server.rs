//! TCP listener speaking the framed LOD protocol

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

use farsight_protocol::{ClientMessage, ProtocolError, ServerMessage, read_message, write_message};

use super::service::LodService;
use crate::core::{Result, WorldId};

/// Server handle - keep this alive to keep the listener running
pub struct LodServer {
    local_addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl LodServer {
    /// Bind and start accepting connections in the background.
    ///
    /// Without a host to place players, every connection joins
    /// `default_world` if one is given.
    pub async fn bind(addr: &str, service: Arc<LodService>, default_world: Option<WorldId>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        log::info!("LOD server listening on {}", local_addr);

        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let service = service.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer, service, default_world).await;
                        });
                    }
                    Err(e) => {
                        log::error!("LOD server accept error: {}", e);
                    }
                }
            }
        });

        Ok(Self { local_addr, handle })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, service: Arc<LodService>, default_world: Option<WorldId>) {
    let player_id = Uuid::new_v4();
    log::info!("Client {} connected as {}", peer, player_id);

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let (session, mut outbound) = service.connect(player_id);

    // Ends on a close, a failed write or a closed channel; the reader below
    // stops with it
    let mut writer_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let closing = matches!(message, ServerMessage::CloseReason { .. });
            if let Err(e) = write_message(&mut writer, &message).await {
                log::warn!("Could not send to {}: {}", peer, e);
                if matches!(e, ProtocolError::FrameTooLarge(_)) {
                    // Nothing was written, the stream is still in sync
                    let close = ServerMessage::close(format!("could not send message: {}", e));
                    let _ = write_message(&mut writer, &close).await;
                }
                break;
            }
            if closing {
                break;
            }
        }
    });

    if let Some(world_id) = default_world {
        if let Err(e) = service.set_player_world(player_id, world_id) {
            log::warn!("Could not place {} in world {}: {}", player_id, world_id, e);
        }
    }

    let mut writer_done = false;
    loop {
        let read = tokio::select! {
            read = read_message::<_, ClientMessage>(&mut reader) => read,
            _ = &mut writer_task => {
                writer_done = true;
                break;
            }
        };
        match read {
            Ok(Some(message @ ClientMessage::FullDataRequest { .. })) => {
                // Generation can take a while; keep reading meanwhile
                let service = service.clone();
                let session = session.clone();
                tokio::spawn(async move { service.handle_message(&session, message).await });
            }
            Ok(Some(message)) => service.handle_message(&session, message).await,
            Ok(None) => break,
            Err(e) => {
                log::warn!("Closing {}: {}", peer, e);
                session.send(ServerMessage::close(format!("protocol error: {}", e)));
                break;
            }
        }
    }

    service.disconnect(player_id);
    drop(session);
    if !writer_done {
        let _ = writer_task.await;
    }
    log::info!("Client {} disconnected", peer);
}
