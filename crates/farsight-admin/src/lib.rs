//! Operator surface for a running farsight server - JSON-lines over TCP
//!
//! The server embeds an [`AdminServer`] and implements [`AdminHandler`]:
//! ```ignore
//! let handler: Arc<dyn AdminHandler> = Arc::new(MyHandler::new());
//! let server = AdminServer::bind(handler, "127.0.0.1:9743").await?;
//! // ...
//! server.shutdown().await;
//! ```

pub mod protocol;
pub mod server;

pub use protocol::*;
pub use server::{AdminHandler, AdminServer, MAX_LINE_BYTES};

/// Default admin port
pub const DEFAULT_PORT: u16 = 9743;
