//! Client-facing protocol: sessions, request handling, TCP transport

pub mod server;
pub mod service;
pub mod session;

pub use server::LodServer;
pub use service::LodService;
pub use session::{PlayerSession, RequestSlot, SessionRegistry};
