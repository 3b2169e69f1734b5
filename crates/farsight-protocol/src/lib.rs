//! Wire protocol spoken between a farsight server and distant-terrain clients.
//!
//! Messages are serde enums encoded with bincode and framed with a
//! big-endian `u32` length prefix. Large LOD payloads never travel inside a
//! single message: they are split into [`FullDataChunk`]s tagged with a
//! per-session buffer id and reassembled on the receiving side.

pub mod codec;
pub mod message;
pub mod split;

pub use codec::{ProtocolError, decode_body, encode_frame, read_message, write_message};
pub use message::*;
pub use split::{ChunkAssembler, split_into_chunks};

/// Protocol revision, bumped on any incompatible message change
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum payload bytes carried by one [`FullDataChunk`]
pub const FULL_DATA_CHUNK_SIZE: usize = 16 * 1024;

/// Upper bound on an encoded frame; anything larger is a protocol violation
pub const MAX_FRAME_SIZE: usize = 4 * FULL_DATA_CHUNK_SIZE;
