//! LOD builders and the registry that selects one by name

pub mod fast_overworld;
pub mod predicate;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::{Error, Result};
use crate::lod::{Lod, SectionPosition};
use crate::world::WorldInterface;

pub use fast_overworld::FastOverworldBuilder;
pub use predicate::{MaterialPredicate, MaterialSet};

/// Builder type used when nothing is configured
pub const DEFAULT_BUILDER: &str = "fast_overworld";
/// Builder type that disables generation for a world
pub const NO_BUILDER: &str = "none";

/// Scans a world region and produces its [`Lod`].
///
/// `generate` only reads world state; it runs on the thread the scheduler
/// hands out for the section and the required chunks are loaded first.
pub trait LodBuilder: Send + Sync {
    fn name(&self) -> &str;

    /// Chunks that must be loaded before [`generate`](Self::generate)
    fn required_chunks(&self, position: SectionPosition) -> Vec<(i32, i32)> {
        position.chunks().collect()
    }

    fn generate(&self, world: &dyn WorldInterface, position: SectionPosition) -> Result<Lod>;
}

/// Tunables shared by the column-scanning builders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderSettings {
    /// Vertical resolution in blocks
    pub y_step: u32,
    /// Describe grass, fences and similar blocks sitting on the surface
    pub include_non_colliding_top_layer: bool,
    /// Apply the ground cutoff even when the ground is above sea level
    pub scan_to_sea_level: bool,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            y_step: 4,
            include_non_colliding_top_layer: false,
            scan_to_sea_level: false,
        }
    }
}

type Factory = Arc<dyn Fn(&BuilderSettings) -> Option<Arc<dyn LodBuilder>> + Send + Sync>;

/// Maps builder type names to constructors.
///
/// A factory returning `None` stands for "generation unavailable".
#[derive(Clone)]
pub struct BuilderRegistry {
    factories: BTreeMap<String, Factory>,
}

impl BuilderRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the built-in builder types
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_BUILDER, |settings: &BuilderSettings| {
            let builder: Arc<dyn LodBuilder> = Arc::new(FastOverworldBuilder::new(settings.clone()));
            Some(builder)
        });
        registry.register(NO_BUILDER, |_: &BuilderSettings| None);
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&BuilderSettings) -> Option<Arc<dyn LodBuilder>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_ascii_lowercase(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Construct the builder registered under `name`
    pub fn resolve(&self, name: &str, settings: &BuilderSettings) -> Result<Option<Arc<dyn LodBuilder>>> {
        let factory = self.factories.get(&name.to_ascii_lowercase()).ok_or_else(|| {
            Error::Config(format!(
                "unknown builder type '{}' (known: {})",
                name,
                self.names().join(", ")
            ))
        })?;
        if settings.y_step == 0 {
            return Err(Error::Config("y_step must be at least 1".into()));
        }
        Ok(factory(settings))
    }
}

impl Default for BuilderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
