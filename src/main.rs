//! Facewatch - Face Recognition Detection Orchestrator
//!
//! Main entry point for the facewatch daemon.

use facewatch::{
    collaborators::{FileMatchStore, NoFaceCounter, NoMasking},
    config_store::ConfigStore,
    detectors::build_registry,
    dispatcher::FanoutDispatcher,
    normalizer::NoActionChecks,
    polling::PollingController,
    polling_orchestrator::PollingOrchestrator,
    state::{AppConfig, AppState},
    stream_fetcher::StreamFetcher,
    training::TrainingService,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "facewatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting facewatch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        config_path = %config.config_path.display(),
        temp_dir = %config.temp_dir.display(),
        media_dir = %config.media_dir.display(),
        poll_interval_secs = config.poll_interval_secs,
        "Configuration loaded"
    );

    tokio::fs::create_dir_all(&config.temp_dir).await?;

    let config_store = Arc::new(ConfigStore::load(&config.config_path).await?);

    // Build backend registry and services
    let registry = build_registry(config_store.detectors());

    let fetcher = Arc::new(StreamFetcher::new());
    let masker = Arc::new(NoMasking);
    let face_counter = Arc::new(NoFaceCounter);
    let match_store = Arc::new(FileMatchStore::new(config.media_dir.clone()).await?);

    let dispatcher = Arc::new(FanoutDispatcher::new(
        config_store.clone(),
        registry.clone(),
        face_counter.clone(),
        Arc::new(NoActionChecks),
    ));

    let controller = Arc::new(PollingController::new(
        config_store.clone(),
        fetcher.clone(),
        dispatcher.clone(),
        masker.clone(),
        match_store.clone(),
        config.temp_dir.clone(),
    ));

    let orchestrator = Arc::new(PollingOrchestrator::new(
        config_store.clone(),
        controller.clone(),
        Duration::from_secs(config.poll_interval_secs),
    ));

    let training = Arc::new(TrainingService::new(registry));

    let state = AppState {
        config,
        config_store,
        fetcher,
        dispatcher,
        controller,
        orchestrator: orchestrator.clone(),
        training,
        masker,
        face_counter,
        match_store,
    };

    tracing::info!(
        cameras = state.config_store.cameras().len(),
        detectors = state.config_store.detectors().len(),
        "Components initialized"
    );

    orchestrator.start().await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    orchestrator.stop().await;

    Ok(())
}
