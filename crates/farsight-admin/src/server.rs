//! JSON-lines admin listener
//!
//! One command per line, one response line per command. Lines longer than
//! [`MAX_LINE_BYTES`] are answered with an error and the connection is
//! dropped.

use futures::future::BoxFuture;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::protocol::{AdminCommand, AdminResponse};

/// Longest accepted command line, newline included
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Implemented by the server to execute admin commands
pub trait AdminHandler: Send + Sync + 'static {
    fn handle_command(&self, cmd: AdminCommand) -> BoxFuture<'_, AdminResponse>;
}

/// Running admin listener. Dropping the handle does not stop it; call
/// [`shutdown`](Self::shutdown).
pub struct AdminServer {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept: JoinHandle<()>,
}

impl AdminServer {
    /// Bind `addr` and serve in the background
    pub async fn bind(handler: Arc<dyn AdminHandler>, addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        log::info!("Admin server listening on {}", local_addr);

        let (shutdown, stop) = watch::channel(false);
        let accept = tokio::spawn(accept_loop(listener, handler, stop));
        Ok(Self {
            local_addr,
            shutdown,
            accept,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and close every connection after its current command
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        let _ = self.accept.await;
        log::info!("Admin server on {} stopped", self.local_addr);
    }
}

async fn accept_loop(listener: TcpListener, handler: Arc<dyn AdminHandler>, mut stop: watch::Receiver<bool>) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = stop.wait_for(|stopped| *stopped) => break,
        };
        match accepted {
            Ok((stream, peer)) => {
                log::info!("Admin client {} connected", peer);
                let handler = handler.clone();
                let stop = stop.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve(stream, peer, handler, stop).await {
                        log::warn!("Admin client {}: {}", peer, e);
                    }
                    log::info!("Admin client {} disconnected", peer);
                });
            }
            Err(e) => log::error!("Admin accept failed: {}", e),
        }
    }
}

async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn AdminHandler>,
    mut stop: watch::Receiver<bool>,
) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64);
        let read = tokio::select! {
            read = limited.read_line(&mut line) => read?,
            _ = stop.wait_for(|stopped| *stopped) => return Ok(()),
        };
        if read == 0 {
            return Ok(());
        }
        if !line.ends_with('\n') && read == MAX_LINE_BYTES {
            let response = AdminResponse::error(format!("command longer than {} bytes", MAX_LINE_BYTES));
            write_response(&mut writer, &response).await?;
            return Ok(());
        }

        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<AdminCommand>(command) {
            Ok(cmd) => {
                log::info!("Admin {}: {:?}", peer, cmd);
                handler.handle_command(cmd).await
            }
            Err(e) => AdminResponse::error(format!("invalid command: {}", e)),
        };
        if let AdminResponse::Error { message } = &response {
            log::warn!("Admin {} failed: {}", peer, message);
        }
        write_response(&mut writer, &response).await?;
    }
}

async fn write_response<W>(writer: &mut W, response: &AdminResponse) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut json = serde_json::to_string(response)
        .unwrap_or_else(|e| serde_json::json!({ "status": "error", "message": e.to_string() }).to_string());
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResponseData;
    use futures::FutureExt;

    struct Echo;

    impl AdminHandler for Echo {
        fn handle_command(&self, cmd: AdminCommand) -> BoxFuture<'_, AdminResponse> {
            async move {
                match cmd {
                    AdminCommand::Ping => AdminResponse::pong(),
                    other => AdminResponse::ok(ResponseData::Reloaded {
                        description: format!("{:?}", other),
                    }),
                }
            }
            .boxed()
        }
    }

    async fn connect(server: &AdminServer) -> (BufReader<tokio::net::tcp::OwnedReadHalf>, tokio::net::tcp::OwnedWriteHalf) {
        let stream = TcpStream::connect(server.local_addr()).await.unwrap();
        let (reader, writer) = stream.into_split();
        (BufReader::new(reader), writer)
    }

    async fn response(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> Option<AdminResponse> {
        let mut line = String::new();
        match reader.read_line(&mut line).await.unwrap() {
            0 => None,
            _ => Some(serde_json::from_str(&line).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_commands_and_bad_json() {
        let server = AdminServer::bind(Arc::new(Echo), "127.0.0.1:0").await.unwrap();
        let (mut reader, mut writer) = connect(&server).await;

        writer.write_all(b"{\"cmd\":\"Ping\"}\n\n{\"cmd\":\"Pause\"}\n").await.unwrap();
        assert_eq!(response(&mut reader).await, Some(AdminResponse::pong()));
        assert!(matches!(response(&mut reader).await, Some(AdminResponse::Ok { .. })));

        writer.write_all(b"not json\n").await.unwrap();
        match response(&mut reader).await {
            Some(AdminResponse::Error { message }) => assert!(message.starts_with("invalid command")),
            other => panic!("unexpected {:?}", other),
        }
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_long_line_closes_connection() {
        let server = AdminServer::bind(Arc::new(Echo), "127.0.0.1:0").await.unwrap();
        let (mut reader, mut writer) = connect(&server).await;

        writer.write_all(&vec![b'x'; MAX_LINE_BYTES]).await.unwrap();
        assert!(matches!(response(&mut reader).await, Some(AdminResponse::Error { .. })));
        assert_eq!(response(&mut reader).await, None);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_connections() {
        let server = AdminServer::bind(Arc::new(Echo), "127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        let (mut reader, _writer) = connect(&server).await;
        // Let the accept loop hand the connection off
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        server.shutdown().await;
        assert_eq!(response(&mut reader).await, None);
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
