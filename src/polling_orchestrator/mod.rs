//! PollingOrchestrator - Sequential Camera Polling
//!
//! ## Responsibilities
//!
//! - Sequential camera polling (1 at a time)
//! - Scheduled run construction per enabled camera
//! - Integration with the PollingController

use crate::config_store::ConfigStore;
use crate::models::{DetectionEvent, EventKind};
use crate::polling::{PollingController, PollingOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::interval;
use uuid::Uuid;

/// PollingOrchestrator instance
pub struct PollingOrchestrator {
    config: Arc<ConfigStore>,
    controller: Arc<PollingController>,
    poll_interval: Duration,
    running: Arc<RwLock<bool>>,
}

impl PollingOrchestrator {
    /// Create new PollingOrchestrator
    pub fn new(
        config: Arc<ConfigStore>,
        controller: Arc<PollingController>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            config,
            controller,
            poll_interval,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start polling loop
    pub async fn start(&self) {
        {
            let mut running = self.running.write().await;
            if *running {
                tracing::warn!("Polling already running");
                return;
            }
            *running = true;
        }

        tracing::info!("Starting polling orchestrator");

        let config = self.config.clone();
        let controller = self.controller.clone();
        let running = self.running.clone();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut interval = interval(poll_interval);

            loop {
                interval.tick().await;

                {
                    let is_running = running.read().await;
                    if !*is_running {
                        break;
                    }
                }

                // Poll each enabled camera sequentially
                for camera in config.enabled_cameras() {
                    let mut event = DetectionEvent::new(
                        camera.name.clone(),
                        Uuid::new_v4().to_string(),
                        EventKind::Scheduled,
                    );
                    let opts = PollingOptions {
                        url: camera.snapshot_url.clone(),
                        retries: camera.retries,
                        break_match: camera.break_match,
                        delay: camera.delay,
                    };

                    let outcome = controller.run(&mut event, &opts).await;

                    let matches = outcome
                        .results
                        .iter()
                        .flat_map(|o| &o.results)
                        .filter(|r| r.is_match)
                        .count();
                    if matches > 0 {
                        tracing::info!(
                            camera = %camera.name,
                            matches = matches,
                            duration = outcome.duration,
                            "Camera poll found matches"
                        );
                    }

                    // Small delay between cameras
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }

            tracing::info!("Polling orchestrator stopped");
        });
    }

    /// Stop polling loop
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        tracing::info!("Stopping polling orchestrator");
    }
}
