//! Spiral pre-generation of LODs around a center

pub mod manager;
pub mod spiral;
pub mod walker;

pub use manager::PreGenManager;
pub use spiral::SpiralWalk;
pub use walker::{PreGenProgress, PreGenRequest, PreGenStatus, PreGenerator};
