//! Server configuration
//!
//! A TOML file deserialized into [`ServerConfig`]. Every field has a default
//! so partial files work; per-world sections override global values field
//! by field. [`ConfigHandle`] owns the live configuration and the builders
//! resolved from it, and swaps both atomically on reload.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use farsight_protocol::{BorderBounds, RemoteConfig};

use crate::builder::{BuilderRegistry, BuilderSettings, DEFAULT_BUILDER, LodBuilder};
use crate::core::{Error, Result};
use crate::world::WorldInterface;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Master switch for distant generation
    pub enabled: bool,
    /// LOD protocol listener
    pub listen_addr: String,
    /// Admin listener port on 127.0.0.1
    pub admin_port: u16,
    pub storage_path: PathBuf,
    /// Render distance in chunks, also the border margin
    pub render_distance: u32,
    pub generation: GenerationConfig,
    pub limits: LimitsConfig,
    pub real_time: RealTimeConfig,
    pub border: BorderMode,
    pub worlds: HashMap<String, WorldOverrides>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:25590".into(),
            admin_port: farsight_admin::DEFAULT_PORT,
            storage_path: PathBuf::from("farsight-lods"),
            render_distance: 256,
            generation: GenerationConfig::default(),
            limits: LimitsConfig::default(),
            real_time: RealTimeConfig::default(),
            border: BorderMode::default(),
            worlds: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Builder type name, see [`BuilderRegistry`]
    pub builder: String,
    #[serde(flatten)]
    pub settings: BuilderSettings,
    /// Let chunk loads generate chunks that do not exist yet
    pub generate_new_chunks: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            builder: DEFAULT_BUILDER.into(),
            settings: BuilderSettings::default(),
            generate_new_chunks: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Outstanding full-data requests per player
    pub max_requests_per_player: u32,
    /// Concurrent requests issued by one pre-generation run
    pub pregen_max_in_flight: usize,
    pub pregen_progress_interval_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_requests_per_player: 32,
            pregen_max_in_flight: 8,
            pregen_progress_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealTimeConfig {
    pub enabled: bool,
    /// Sections around a player that receive pushed updates
    pub update_radius: u32,
    pub tick_interval_ms: u64,
}

impl Default for RealTimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            update_radius: 8,
            tick_interval_ms: 1000,
        }
    }
}

/// Where requests are allowed, in blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BorderMode {
    /// Use the world's own border, unbounded if it has none
    #[default]
    Vanilla,
    Custom { center_x: i32, center_z: i32, radius: u32 },
    #[serde(rename = "none")]
    Unbounded,
}

/// Per-world overrides; unset fields fall back to the global value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldOverrides {
    pub enabled: Option<bool>,
    pub builder: Option<String>,
    pub y_step: Option<u32>,
    pub include_non_colliding_top_layer: Option<bool>,
    pub scan_to_sea_level: Option<bool>,
    pub generate_new_chunks: Option<bool>,
    pub real_time_enabled: Option<bool>,
    pub update_radius: Option<u32>,
    pub border: Option<BorderMode>,
}

/// Effective settings for one world
#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    pub name: String,
    pub enabled: bool,
    pub builder: String,
    pub settings: BuilderSettings,
    pub generate_new_chunks: bool,
    pub real_time_enabled: bool,
    pub update_radius: u32,
    pub border: BorderMode,
    pub render_distance: u32,
    pub max_requests_per_player: u32,
}

impl WorldConfig {
    /// Border to enforce for `world`, if any
    pub fn border_bounds(&self, world: &dyn WorldInterface) -> Option<BorderBounds> {
        match self.border {
            BorderMode::Vanilla => world.border(),
            BorderMode::Custom {
                center_x,
                center_z,
                radius,
            } => Some(BorderBounds {
                center_x,
                center_z,
                radius,
            }),
            BorderMode::Unbounded => None,
        }
    }

    /// Server side of the session config exchange
    pub fn remote_config(&self, world: &dyn WorldInterface) -> RemoteConfig {
        RemoteConfig {
            distant_generation_enabled: self.enabled,
            real_time_updates_enabled: self.real_time_enabled,
            render_distance: self.render_distance,
            max_requests_in_flight: self.max_requests_per_player,
            update_radius: self.update_radius,
            border: self.border_bounds(world),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| Error::Config(format!("parse error: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Resolve the effective settings for a world
    pub fn world(&self, name: &str) -> WorldConfig {
        let overrides = self.worlds.get(name).cloned().unwrap_or_default();
        let defaults = &self.generation.settings;
        WorldConfig {
            name: name.to_string(),
            enabled: self.enabled && overrides.enabled.unwrap_or(true),
            builder: overrides.builder.unwrap_or_else(|| self.generation.builder.clone()),
            settings: BuilderSettings {
                y_step: overrides.y_step.unwrap_or(defaults.y_step),
                include_non_colliding_top_layer: overrides
                    .include_non_colliding_top_layer
                    .unwrap_or(defaults.include_non_colliding_top_layer),
                scan_to_sea_level: overrides.scan_to_sea_level.unwrap_or(defaults.scan_to_sea_level),
            },
            generate_new_chunks: overrides
                .generate_new_chunks
                .unwrap_or(self.generation.generate_new_chunks),
            real_time_enabled: overrides.real_time_enabled.unwrap_or(self.real_time.enabled),
            update_radius: overrides.update_radius.unwrap_or(self.real_time.update_radius),
            border: overrides.border.unwrap_or(self.border),
            render_distance: self.render_distance,
            max_requests_per_player: self.limits.max_requests_per_player,
        }
    }
}

struct Resolved {
    config: Arc<ServerConfig>,
    /// `None` when the builder type is `none`
    default_builder: Option<Arc<dyn LodBuilder>>,
    world_builders: HashMap<String, Option<Arc<dyn LodBuilder>>>,
}

impl Resolved {
    fn new(config: ServerConfig, registry: &BuilderRegistry) -> Result<Self> {
        let default_builder = registry.resolve(&config.generation.builder, &config.generation.settings)?;
        let mut world_builders = HashMap::new();
        for name in config.worlds.keys() {
            let world = config.world(name);
            let builder = registry
                .resolve(&world.builder, &world.settings)
                .map_err(|e| Error::Config(format!("world '{}': {}", name, e)))?;
            world_builders.insert(name.clone(), builder);
        }
        Ok(Self {
            config: Arc::new(config),
            default_builder,
            world_builders,
        })
    }
}

/// Live configuration shared by every service
pub struct ConfigHandle {
    path: Option<PathBuf>,
    registry: BuilderRegistry,
    state: RwLock<Arc<Resolved>>,
}

impl ConfigHandle {
    /// Validate `config` and resolve its builders
    pub fn new(config: ServerConfig, registry: BuilderRegistry) -> Result<Self> {
        let resolved = Resolved::new(config, &registry)?;
        Ok(Self {
            path: None,
            registry,
            state: RwLock::new(Arc::new(resolved)),
        })
    }

    /// Load from a file that [`reload`](Self::reload) re-reads later
    pub fn load(path: impl Into<PathBuf>, registry: BuilderRegistry) -> Result<Self> {
        let path = path.into();
        let mut handle = Self::new(ServerConfig::load(&path)?, registry)?;
        handle.path = Some(path);
        Ok(handle)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn current(&self) -> Arc<ServerConfig> {
        self.resolved().config.clone()
    }

    pub fn world(&self, name: &str) -> WorldConfig {
        self.resolved().config.world(name)
    }

    /// Builder configured for a world, `None` if generation is unavailable
    pub fn builder_for(&self, world_name: &str) -> Option<Arc<dyn LodBuilder>> {
        let resolved = self.resolved();
        match resolved.world_builders.get(world_name) {
            Some(builder) => builder.clone(),
            None => resolved.default_builder.clone(),
        }
    }

    /// Swap in a new configuration; on error the current one stays
    pub fn replace(&self, config: ServerConfig) -> Result<()> {
        let resolved = Resolved::new(config, &self.registry)?;
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(resolved);
        Ok(())
    }

    /// Re-read the configuration file
    pub fn reload(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| Error::Config("configuration was not loaded from a file".into()))?;
        self.replace(ServerConfig::load(path)?)?;
        log::info!("Reloaded configuration from {}", path.display());
        Ok(())
    }

    fn resolved(&self) -> Arc<Resolved> {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::SyntheticWorld;
    use std::io::Write;

    const SAMPLE: &str = r#"
        render_distance = 64

        [generation]
        builder = "fast_overworld"
        y_step = 2

        [limits]
        max_requests_per_player = 4

        [border]
        mode = "custom"
        center_x = 0
        center_z = 0
        radius = 1000

        [worlds.the_nether]
        builder = "none"

        [worlds.creative]
        y_step = 1
        real_time_enabled = false
        border = { mode = "none" }
    "#;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = ServerConfig::from_toml_str("enabled = false").unwrap();
        assert!(!config.enabled);
        assert_eq!(config.generation, GenerationConfig::default());
        assert_eq!(config.limits.pregen_max_in_flight, 8);
        assert_eq!(config.border, BorderMode::Vanilla);
    }

    #[test]
    fn test_world_overrides() {
        let config = ServerConfig::from_toml_str(SAMPLE).unwrap();
        let overworld = config.world("overworld");
        assert_eq!(overworld.settings.y_step, 2);
        assert_eq!(overworld.max_requests_per_player, 4);
        assert_eq!(
            overworld.border,
            BorderMode::Custom {
                center_x: 0,
                center_z: 0,
                radius: 1000
            }
        );

        let creative = config.world("creative");
        assert_eq!(creative.settings.y_step, 1);
        assert!(!creative.real_time_enabled);
        assert_eq!(creative.border, BorderMode::Unbounded);
        assert_eq!(config.world("the_nether").builder, "none");
    }

    #[test]
    fn test_remote_config_uses_vanilla_border() {
        let config = ServerConfig::default().world("overworld");
        let border = BorderBounds {
            center_x: 10,
            center_z: -10,
            radius: 500,
        };
        let world = SyntheticWorld::flat("overworld", 0, 16, &[]).with_border(border);
        let remote = config.remote_config(&world);
        assert_eq!(remote.border, Some(border));
        assert_eq!(remote.render_distance, 256);
    }

    #[test]
    fn test_handle_resolves_builders() {
        let handle = ConfigHandle::new(ServerConfig::from_toml_str(SAMPLE).unwrap(), BuilderRegistry::with_defaults())
            .unwrap();
        assert!(handle.builder_for("overworld").is_some());
        assert!(handle.builder_for("the_nether").is_none());
        assert!(handle.builder_for("creative").is_some());
    }

    #[test]
    fn test_unknown_builder_rejected() {
        let config = ServerConfig::from_toml_str("[generation]\nbuilder = \"mystery\"").unwrap();
        assert!(matches!(
            ConfigHandle::new(config, BuilderRegistry::with_defaults()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_reload_keeps_old_config_on_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "render_distance = 32").unwrap();
        let handle = ConfigHandle::load(file.path(), BuilderRegistry::with_defaults()).unwrap();
        assert_eq!(handle.current().render_distance, 32);

        std::fs::write(file.path(), "render_distance = 48").unwrap();
        handle.reload().unwrap();
        assert_eq!(handle.current().render_distance, 48);

        std::fs::write(file.path(), "[worlds.broken]\nbuilder = \"mystery\"").unwrap();
        assert!(handle.reload().is_err());
        assert_eq!(handle.current().render_distance, 48);
    }
}
