//! PollingController - Per-Event Detection Run
//!
//! ## Responsibilities
//!
//! - Drive one polling run: validate -> (fetch <-> sleep) -> dispatch ->
//!   classify -> persist, across a bounded number of attempts
//! - Match-triggered early exit against the shared matched-id set
//! - Guaranteed temp-file cleanup on every exit path of an attempt
//!
//! The controller is the only component holding cross-attempt state:
//! attempt counter, change fingerprint, matched ids, per-backend error
//! counters. A run always returns a structured outcome, never an error.

use crate::change_detector::ChangeDetector;
use crate::collaborators::{ImageMasker, MatchStore};
use crate::config_store::ConfigStore;
use crate::dispatcher::FanoutDispatcher;
use crate::models::{round2, DetectionEvent, EventKind, RunOutcome};
use crate::stream_fetcher::ImageSource;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::time::sleep;
use uuid::Uuid;

/// Options for one polling run
#[derive(Debug, Clone)]
pub struct PollingOptions {
    /// Snapshot source URL
    pub url: String,
    /// Maximum polling attempts
    pub retries: u32,
    /// Stop the run once a match is found
    pub break_match: bool,
    /// Post-event delay in seconds, applied between attempts of triggered
    /// runs
    pub delay: f64,
}

/// PollingController instance
pub struct PollingController {
    config: Arc<ConfigStore>,
    fetcher: Arc<dyn ImageSource>,
    dispatcher: Arc<FanoutDispatcher>,
    masker: Arc<dyn ImageMasker>,
    store: Arc<dyn MatchStore>,
    temp_dir: PathBuf,
}

impl PollingController {
    pub fn new(
        config: Arc<ConfigStore>,
        fetcher: Arc<dyn ImageSource>,
        dispatcher: Arc<FanoutDispatcher>,
        masker: Arc<dyn ImageMasker>,
        store: Arc<dyn MatchStore>,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            fetcher,
            dispatcher,
            masker,
            store,
            temp_dir,
        }
    }

    /// Temp path uniquely owned by one attempt
    fn temp_path(&self, event: &DetectionEvent) -> PathBuf {
        self.temp_dir.join(format!(
            "{}-{}-{}.jpg",
            event.id,
            event.kind.as_str(),
            Uuid::new_v4()
        ))
    }

    /// Execute one polling run. The sole entry point of the engine.
    pub async fn run(&self, event: &mut DetectionEvent, opts: &PollingOptions) -> RunOutcome {
        let started = Instant::now();
        let mut all_results = Vec::new();
        let mut attempts = 0u32;
        let mut change = ChangeDetector::new();

        tracing::info!(
            camera = %event.camera,
            event_id = %event.id,
            kind = event.kind.as_str(),
            retries = opts.retries,
            "Polling run started"
        );

        // entry guard: an invalid source aborts with zero attempts
        if !self.fetcher.validate(&opts.url).await {
            tracing::warn!(
                camera = %event.camera,
                event_id = %event.id,
                "Source unavailable, aborting run"
            );
            return RunOutcome {
                duration: round2(started.elapsed().as_secs_f64()),
                kind: event.kind,
                attempts: 0,
                results: all_results,
            };
        }

        let detect = self.config.detect_for(&event.camera);

        for i in 0..opts.retries {
            if opts.break_match && event.matched_ids.lock().await.contains(&event.id) {
                tracing::debug!(
                    event_id = %event.id,
                    "Event already matched, stopping run"
                );
                break;
            }

            let fetched = self.fetcher.fetch(&opts.url).await;
            let changed = change.observe(fetched.as_ref().map(|b| b.len()));

            if let (true, Some(bytes)) = (changed, fetched) {
                attempts = i + 1;

                let source_path = self.temp_path(event);
                let filename = format!("{}.jpg", Uuid::new_v4());

                if let Err(e) = fs::write(&source_path, &bytes).await {
                    tracing::error!(
                        camera = %event.camera,
                        error = %e,
                        "Temp image write failed, skipping attempt"
                    );
                    continue;
                }

                // masking collaborator may substitute a masked copy or
                // report the original is acceptable
                let mut mask_path = None;
                let mut mask_visible = false;
                match self.masker.mask(event, &source_path).await {
                    Ok(Some(outcome)) => {
                        let path = if outcome.visible {
                            source_path.clone()
                        } else {
                            self.temp_path(event)
                        };
                        if let Err(e) = fs::write(&path, &outcome.buffer).await {
                            tracing::error!(error = %e, "Mask write failed, using original");
                        } else {
                            mask_visible = outcome.visible;
                            mask_path = Some(path);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(
                            camera = %event.camera,
                            error = %e,
                            "Masking failed, using original"
                        );
                    }
                }

                let process_path = mask_path.clone().unwrap_or_else(|| source_path.clone());

                let outcomes = self
                    .dispatcher
                    .dispatch(event, &process_path, &filename, attempts)
                    .await;

                let found_match = outcomes.iter().any(|o| o.has_match());
                let total_faces = outcomes.iter().any(|o| !o.results.is_empty());

                if found_match || (detect.unknown.save && total_faces) {
                    let winning = if mask_visible {
                        mask_path.as_deref().unwrap_or(source_path.as_path())
                    } else {
                        source_path.as_path()
                    };
                    if let Err(e) = self
                        .store
                        .persist(event, &outcomes, &filename, winning)
                        .await
                    {
                        // classification stands; persistence never rolls
                        // back or aborts the run
                        tracing::error!(
                            camera = %event.camera,
                            event_id = %event.id,
                            error = %e,
                            "Persistence failed"
                        );
                    }
                }

                all_results.extend(outcomes);

                // unconditional temp cleanup before any continue/break
                if let Some(path) = &mask_path {
                    if *path != source_path {
                        let _ = fs::remove_file(path).await;
                    }
                }
                let _ = fs::remove_file(&source_path).await;

                if found_match {
                    event.matched_ids.lock().await.insert(event.id.clone());
                    if opts.break_match {
                        break;
                    }
                }

                // a changed attempt with a triggered delay still spaces out
                if event.kind == EventKind::Triggered && opts.delay > 0.0 {
                    sleep(Duration::from_secs_f64(opts.delay)).await;
                }
            } else {
                // unchanged source: space out polling with a linearly
                // increasing backoff, or the configured triggered delay
                let secs = if event.kind == EventKind::Triggered && opts.delay > 0.0 {
                    opts.delay
                } else {
                    i as f64 * 0.1
                };
                if secs > 0.0 {
                    sleep(Duration::from_secs_f64(secs)).await;
                }
            }
        }

        let outcome = RunOutcome {
            duration: round2(started.elapsed().as_secs_f64()),
            kind: event.kind,
            attempts,
            results: all_results,
        };

        tracing::info!(
            camera = %event.camera,
            event_id = %event.id,
            duration = outcome.duration,
            attempts = outcome.attempts,
            results = outcome.results.len(),
            "Polling run finished"
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FaceCounter, MaskOutcome, NoFaceCounter, NoMasking};
    use crate::detectors::{Detector, DetectorRegistry};
    use crate::error::Result;
    use crate::models::{AttemptOutcome, PixelBox, RawPrediction, RawResponse};
    use crate::normalizer::NoActionChecks;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Image source scripted with a fixed fetch sequence
    struct ScriptedSource {
        valid: bool,
        fetches: Mutex<std::collections::VecDeque<Option<Vec<u8>>>>,
    }

    impl ScriptedSource {
        fn new(valid: bool, fetches: Vec<Option<Vec<u8>>>) -> Arc<Self> {
            Arc::new(Self {
                valid,
                fetches: Mutex::new(fetches.into()),
            })
        }
    }

    #[async_trait]
    impl ImageSource for ScriptedSource {
        async fn validate(&self, _url: &str) -> bool {
            self.valid
        }

        async fn fetch(&self, _url: &str) -> Option<Vec<u8>> {
            self.fetches.lock().await.pop_front().flatten()
        }
    }

    /// Backend returning a fixed confidence for every call
    struct FixedDetector {
        confidence: f64,
        calls: AtomicUsize,
    }

    impl FixedDetector {
        fn new(confidence: f64) -> Arc<Self> {
            Arc::new(Self {
                confidence,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Detector for FixedDetector {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn recognize(
            &self,
            _image_path: &Path,
            _regions: Option<&[PixelBox]>,
        ) -> Result<RawResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawResponse::new(200, serde_json::json!({})))
        }

        async fn train(&self, _subject: &str, _image_path: &Path) -> Result<RawResponse> {
            Ok(RawResponse::new(200, serde_json::json!({})))
        }

        async fn remove(&self, _subject: &str) -> Result<RawResponse> {
            Ok(RawResponse::new(200, serde_json::json!({})))
        }

        fn normalize(
            &self,
            _camera: &str,
            _event: &DetectionEvent,
            _raw: &RawResponse,
        ) -> Vec<RawPrediction> {
            if self.confidence == 0.0 {
                Vec::new()
            } else {
                vec![RawPrediction {
                    confidence: self.confidence,
                    label: "Alice".to_string(),
                    bounding_box: PixelBox::new(0, 0, 50, 50),
                }]
            }
        }
    }

    /// Store recording every persist call
    #[derive(Default)]
    struct RecordingStore {
        persisted: Mutex<Vec<Vec<AttemptOutcome>>>,
    }

    #[async_trait]
    impl MatchStore for RecordingStore {
        async fn persist(
            &self,
            _event: &DetectionEvent,
            results: &[AttemptOutcome],
            _filename: &str,
            _image_path: &Path,
        ) -> Result<()> {
            self.persisted.lock().await.push(results.to_vec());
            Ok(())
        }
    }

    fn config(save_unknowns: bool) -> Arc<ConfigStore> {
        let config = serde_json::from_value(serde_json::json!({
            "detectors": [
                { "name": "fixed", "kind": "deepstack", "url": "http://x" }
            ],
            "cameras": [],
            "detect": {
                "match": { "confidence": 80.0, "min_area": 500 },
                "unknown": { "confidence": 40.0, "save": save_unknowns }
            }
        }))
        .unwrap();
        Arc::new(ConfigStore::new(config))
    }

    struct Harness {
        controller: PollingController,
        detector: Arc<FixedDetector>,
        store: Arc<RecordingStore>,
        _tmp: tempfile::TempDir,
    }

    fn harness(
        source: Arc<ScriptedSource>,
        detector: Arc<FixedDetector>,
        save_unknowns: bool,
    ) -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(save_unknowns);

        let mut registry: DetectorRegistry = DetectorRegistry::new();
        registry.insert("fixed".to_string(), detector.clone());

        let face_counter: Arc<dyn FaceCounter> = Arc::new(NoFaceCounter);
        let dispatcher = Arc::new(FanoutDispatcher::new(
            config.clone(),
            registry,
            face_counter,
            Arc::new(NoActionChecks),
        ));

        let store = Arc::new(RecordingStore::default());
        let controller = PollingController::new(
            config,
            source,
            dispatcher,
            Arc::new(NoMasking),
            store.clone(),
            tmp.path().to_path_buf(),
        );

        Harness {
            controller,
            detector,
            store,
            _tmp: tmp,
        }
    }

    fn options(retries: u32, break_match: bool) -> PollingOptions {
        PollingOptions {
            url: "http://cam.local/snap.jpg".to_string(),
            retries,
            break_match,
            delay: 0.0,
        }
    }

    #[tokio::test]
    async fn test_invalid_source_aborts_with_zero_attempts() {
        let source = ScriptedSource::new(false, vec![Some(vec![1, 2, 3])]);
        let detector = FixedDetector::new(0.91);
        let h = harness(source, detector, true);

        let mut event = DetectionEvent::new("garage", "evt-1", EventKind::Scheduled);
        let outcome = h.controller.run(&mut event, &options(3, true)).await;

        assert_eq!(outcome.attempts, 0);
        assert!(outcome.results.is_empty());
        assert_eq!(h.detector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_break_match_stops_after_first_matching_attempt() {
        // three distinct fetches available, but the first already matches
        let source = ScriptedSource::new(
            true,
            vec![Some(vec![1; 100]), Some(vec![1; 200]), Some(vec![1; 300])],
        );
        let detector = FixedDetector::new(0.91);
        let h = harness(source, detector, true);

        let mut event = DetectionEvent::new("garage", "evt-1", EventKind::Scheduled);
        let outcome = h.controller.run(&mut event, &options(3, true)).await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.results[0].has_match());
        assert!(event.matched_ids.lock().await.contains("evt-1"));
        assert_eq!(h.store.persisted.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_fetch_skips_dispatch() {
        // identical byte length across both attempts
        let source = ScriptedSource::new(true, vec![Some(vec![7; 128]), Some(vec![9; 128])]);
        let detector = FixedDetector::new(0.0);
        let h = harness(source, detector, true);

        let mut event = DetectionEvent::new("garage", "evt-1", EventKind::Scheduled);
        let outcome = h.controller.run(&mut event, &options(2, false)).await;

        // attempt 2 saw an equal length and only slept
        assert_eq!(outcome.attempts, 1);
        assert_eq!(h.detector.calls.load(Ordering::SeqCst), 1);
        // no faces came back, so nothing was persisted either
        assert!(h.store.persisted.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_no_match_without_save_unknowns_never_persists() {
        let source = ScriptedSource::new(true, vec![Some(vec![1; 100])]);
        // below match threshold, above unknown threshold
        let detector = FixedDetector::new(0.60);
        let h = harness(source, detector, false);

        let mut event = DetectionEvent::new("garage", "evt-1", EventKind::Scheduled);
        let outcome = h.controller.run(&mut event, &options(1, false)).await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.results[0].results[0].name, "alice");
        assert!(!outcome.results[0].results[0].is_match);
        assert!(h.store.persisted.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_unknowns_persists_whole_result_set() {
        let source = ScriptedSource::new(true, vec![Some(vec![1; 100])]);
        let detector = FixedDetector::new(0.60);
        let h = harness(source, detector, true);

        let mut event = DetectionEvent::new("garage", "evt-1", EventKind::Scheduled);
        h.controller.run(&mut event, &options(1, false)).await;

        let persisted = h.store.persisted.lock().await;
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].len(), 1);
        assert_eq!(persisted[0][0].results[0].name, "alice");
    }

    #[tokio::test]
    async fn test_failed_fetches_consume_attempts_without_dispatch() {
        let source = ScriptedSource::new(true, vec![None, None]);
        let detector = FixedDetector::new(0.91);
        let h = harness(source, detector, true);

        let mut event = DetectionEvent::new("garage", "evt-1", EventKind::Scheduled);
        let outcome = h.controller.run(&mut event, &options(2, true)).await;

        assert_eq!(outcome.attempts, 0);
        assert!(outcome.results.is_empty());
        assert_eq!(h.detector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_temp_files_cleaned_after_run() {
        let source = ScriptedSource::new(true, vec![Some(vec![1; 100]), Some(vec![1; 200])]);
        let detector = FixedDetector::new(0.91);
        let h = harness(source, detector, true);

        let mut event = DetectionEvent::new("garage", "evt-1", EventKind::Scheduled);
        h.controller.run(&mut event, &options(2, false)).await;

        let remaining: Vec<_> = std::fs::read_dir(h._tmp.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert!(remaining.is_empty(), "temp files left behind: {:?}", remaining);
    }

    #[tokio::test]
    async fn test_shared_matched_ids_short_circuit_sibling_runs() {
        let ids = crate::models::matched_ids();
        ids.lock().await.insert("evt-1".to_string());

        let source = ScriptedSource::new(true, vec![Some(vec![1; 100])]);
        let detector = FixedDetector::new(0.91);
        let h = harness(source, detector, true);

        let mut event = DetectionEvent::new("garage", "evt-1", EventKind::Scheduled)
            .with_matched_ids(ids);
        let outcome = h.controller.run(&mut event, &options(3, true)).await;

        assert_eq!(outcome.attempts, 0);
        assert_eq!(h.detector.calls.load(Ordering::SeqCst), 0);
    }

    /// Masker substituting a masked copy that must be used for detection
    struct SubstitutingMasker;

    #[async_trait]
    impl ImageMasker for SubstitutingMasker {
        async fn mask(
            &self,
            _event: &DetectionEvent,
            _image_path: &Path,
        ) -> Result<Option<MaskOutcome>> {
            Ok(Some(MaskOutcome {
                visible: false,
                buffer: b"masked".to_vec(),
            }))
        }
    }

    #[tokio::test]
    async fn test_masked_copy_is_cleaned_up_too() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(true);
        let detector = FixedDetector::new(0.91);

        let mut registry: DetectorRegistry = DetectorRegistry::new();
        registry.insert("fixed".to_string(), detector.clone());
        let dispatcher = Arc::new(FanoutDispatcher::new(
            config.clone(),
            registry,
            Arc::new(NoFaceCounter),
            Arc::new(NoActionChecks),
        ));

        let store = Arc::new(RecordingStore::default());
        let controller = PollingController::new(
            config,
            ScriptedSource::new(true, vec![Some(vec![1; 100])]),
            dispatcher,
            Arc::new(SubstitutingMasker),
            store,
            tmp.path().to_path_buf(),
        );

        let mut event = DetectionEvent::new("garage", "evt-1", EventKind::Scheduled);
        controller.run(&mut event, &options(1, false)).await;

        let remaining: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert!(remaining.is_empty(), "temp files left behind: {:?}", remaining);
    }
}
