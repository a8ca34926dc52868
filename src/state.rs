//! Application state
//!
//! Holds all shared components and state

use crate::collaborators::{FaceCounter, ImageMasker, MatchStore};
use crate::config_store::ConfigStore;
use crate::dispatcher::FanoutDispatcher;
use crate::polling::PollingController;
use crate::polling_orchestrator::PollingOrchestrator;
use crate::stream_fetcher::StreamFetcher;
use crate::training::TrainingService;
use std::path::PathBuf;
use std::sync::Arc;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path to the JSON config document
    pub config_path: PathBuf,
    /// Directory for per-attempt temp images
    pub temp_dir: PathBuf,
    /// Directory persisted matches land in
    pub media_dir: PathBuf,
    /// Scheduler interval between camera sweeps
    pub poll_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_path: std::env::var("FACEWATCH_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/etc/facewatch/config.json")),
            temp_dir: std::env::var("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/lib/facewatch/temp")),
            media_dir: std::env::var("MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/lib/facewatch/media")),
            poll_interval_secs: std::env::var("POLL_INTERVAL_SEC")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        }
    }
}

/// Application state shared across tasks
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// ConfigStore (SSoT)
    pub config_store: Arc<ConfigStore>,
    /// Snapshot fetcher
    pub fetcher: Arc<StreamFetcher>,
    /// FanoutDispatcher (backend fan-out)
    pub dispatcher: Arc<FanoutDispatcher>,
    /// PollingController (per-event detection runs)
    pub controller: Arc<PollingController>,
    /// PollingOrchestrator (camera polling)
    pub orchestrator: Arc<PollingOrchestrator>,
    /// TrainingService (subject registration)
    pub training: Arc<TrainingService>,
    /// Masking collaborator
    pub masker: Arc<dyn ImageMasker>,
    /// Face-count collaborator
    pub face_counter: Arc<dyn FaceCounter>,
    /// Match persistence collaborator
    pub match_store: Arc<dyn MatchStore>,
}
