//! Farsight - server-side level-of-detail generation for distant terrain
//!
//! Sections of a world are summarized into compact column runs
//! ([`lod::Lod`]), cached in a local store and streamed to clients that
//! render far past the normal view distance.

pub mod admin;
pub mod builder;
pub mod config;
pub mod core;
pub mod generation;
pub mod lod;
pub mod net;
pub mod pregen;
pub mod realtime;
pub mod storage;
pub mod world;
