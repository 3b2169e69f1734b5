//! Farsight - standalone LOD server
//!
//! Serves a procedurally generated development world over the LOD protocol
//! and exposes the admin port for `farsight-ctl`.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use farsight::admin::FarsightAdmin;
use farsight::builder::BuilderRegistry;
use farsight::config::{ConfigHandle, ServerConfig};
use farsight::core::{Result, logging};
use farsight::generation::LodCoordinator;
use farsight::net::{LodServer, LodService};
use farsight::pregen::PreGenManager;
use farsight::realtime::{TouchedSections, UpdateDistributor};
use farsight::storage::LodRepository;
use farsight::world::terrain::TerrainParams;
use farsight::world::{SyntheticWorld, TokioScheduler, WorldInterface, WorldRegistry};
use farsight_admin::AdminServer;

#[derive(Parser, Debug)]
#[command(name = "farsight", about = "Serve level-of-detail terrain to distant-horizon clients")]
struct Args {
    /// TOML configuration file; defaults are used when omitted
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Name of the development world
    #[arg(long, default_value = "overworld")]
    world: String,

    /// Stable id of the development world, keys its cached LODs
    #[arg(long, default_value = "00000000-0000-0000-0000-000000000001")]
    world_id: Uuid,

    /// Terrain seed
    #[arg(long, default_value_t = 12345)]
    seed: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let registry = BuilderRegistry::with_defaults();
    let config = match args.config {
        Some(path) => ConfigHandle::load(path, registry)?,
        None => {
            log::info!("No configuration file given, using defaults");
            ConfigHandle::new(ServerConfig::default(), registry)?
        }
    };
    let config = Arc::new(config);
    let settings = config.current();
    if !settings.enabled {
        log::warn!("Distant generation is disabled; requests will be rejected");
    }

    let repository = LodRepository::open(&settings.storage_path)?;

    let terrain = TerrainParams {
        seed: args.seed,
        ..TerrainParams::default()
    };
    let world = Arc::new(SyntheticWorld::noise(&args.world, terrain).with_id(args.world_id));
    let default_world = world.id();
    log::info!("Development world '{}' ({})", world.name(), default_world);
    let worlds = Arc::new(WorldRegistry::new());
    worlds.register(world);

    let coordinator = LodCoordinator::new(
        repository.clone(),
        Arc::new(TokioScheduler::current()?),
        worlds,
        config.clone(),
    );
    let service = Arc::new(LodService::new(coordinator.clone()));

    let touched = Arc::new(TouchedSections::new());
    let distributor = Arc::new(UpdateDistributor::new(service.clone(), touched.clone()));
    let ticker = distributor.spawn(Duration::from_millis(settings.real_time.tick_interval_ms.max(1)));

    let pregen = Arc::new(PreGenManager::new(coordinator.clone()));
    let admin = AdminServer::bind(
        Arc::new(FarsightAdmin::new(service.clone(), pregen.clone(), touched)),
        &format!("127.0.0.1:{}", settings.admin_port),
    )
    .await?;

    let server = LodServer::bind(&settings.listen_addr, service, Some(default_world)).await?;

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");

    server.shutdown();
    admin.shutdown().await;
    ticker.abort();
    pregen.stop_all();
    repository.flush().await?;
    Ok(())
}
