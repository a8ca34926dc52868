//! Facewatch Library
//!
//! Detection orchestration engine for face recognition over IP camera
//! snapshots.
//!
//! ## Architecture (10 Components)
//!
//! 1. ConfigStore - SSoT for detectors, cameras, thresholds
//! 2. StreamFetcher - Snapshot capture with digest auth negotiation
//! 3. ChangeDetector - Byte-length change fingerprinting
//! 4. Detectors - Recognition backend adapters + registry
//! 5. FanoutDispatcher - Concurrent backend fan-out with failure isolation
//! 6. Normalizer - Threshold classification + action checks
//! 7. PollingController - Per-event retry state machine
//! 8. PollingOrchestrator - Scheduled camera sweeps
//! 9. TrainingService - Subject registration across backends
//! 10. Collaborators - Masking, face counting, match persistence seams
//!
//! ## Design Principles
//!
//! - SSoT: ConfigStore is the single source of truth
//! - Failures degrade to empty results at component boundaries; a run
//!   always returns a structured outcome
//! - Adapters own payload-shape knowledge; everything else sees canonical
//!   predictions

pub mod change_detector;
pub mod collaborators;
pub mod config_store;
pub mod detectors;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod polling;
pub mod polling_orchestrator;
pub mod state;
pub mod stream_fetcher;
pub mod training;

pub use error::{Error, Result};
pub use state::AppState;
