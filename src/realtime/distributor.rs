//! Periodic regeneration and push of touched sections

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::touched::TouchedSections;
use crate::lod::{SectionKey, SectionPosition};
use crate::net::LodService;

/// What one tick did, for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub regenerated: usize,
    pub delivered: usize,
    /// Players in the world but beyond their update radius, or with no known position
    pub skipped_out_of_range: usize,
    /// Players whose session is gone or who opted out of updates
    pub skipped_inactive: usize,
    pub failed: usize,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// Single driver of the touched set: drains it, regenerates each section
/// and pushes the result to nearby players.
pub struct UpdateDistributor {
    service: Arc<LodService>,
    touched: Arc<TouchedSections>,
}

impl UpdateDistributor {
    pub fn new(service: Arc<LodService>, touched: Arc<TouchedSections>) -> Self {
        Self { service, touched }
    }

    pub fn touched(&self) -> &Arc<TouchedSections> {
        &self.touched
    }

    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        for key in self.touched.take_touched() {
            self.refresh(key, &mut report).await;
        }
        report
    }

    async fn refresh(&self, key: SectionKey, report: &mut TickReport) {
        let coordinator = self.service.coordinator();
        let Some(world) = coordinator.worlds().get(key.world_id) else {
            log::debug!("Dropping touch for unknown world {}", key.world_id);
            report.failed += 1;
            return;
        };

        let model = match coordinator.regenerate(key.world_id, key.position()).await {
            Ok(model) => model,
            Err(e) => {
                log::warn!("Regenerating [{}, {}] in '{}' failed: {}", key.x, key.z, world.name(), e);
                report.failed += 1;
                return;
            }
        };
        report.regenerated += 1;

        let world_config = coordinator.config().world(world.name());
        if !world_config.real_time_enabled {
            return;
        }
        let server_config = world_config.remote_config(world.as_ref());
        let section = key.position();

        for session in self.service.sessions().in_world(key.world_id) {
            let session_config = session.effective_config(&server_config);
            if !session.is_connected() || !session_config.real_time_updates_enabled {
                report.skipped_inactive += 1;
                continue;
            }
            let in_range = session.position().is_some_and(|(block_x, block_z)| {
                SectionPosition::containing_block(block_x, block_z).distance_to(&section)
                    <= session_config.update_radius
            });
            if !in_range {
                report.skipped_out_of_range += 1;
                continue;
            }
            if self.service.deliver_update(&session, &model) {
                report.delivered += 1;
            } else {
                report.skipped_inactive += 1;
            }
        }
    }

    /// Run [`tick`](Self::tick) every `interval` until the task is aborted
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = self.tick().await;
                if !report.is_idle() {
                    log::debug!("Real-time tick: {:?}", report);
                }
            }
        })
    }
}
