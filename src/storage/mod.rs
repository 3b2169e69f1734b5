//! Persistent LOD storage

pub mod migrations;
pub mod record;
pub mod repository;

pub use record::LodModel;
pub use repository::LodRepository;
