//! FanoutDispatcher - Concurrent Backend Fan-out
//!
//! ## Responsibilities
//!
//! - Build the enabled-backend set per attempt (camera allow-list +
//!   face-count precheck)
//! - Dispatch one recognize call per enabled backend concurrently and wait
//!   for the joint completion
//! - Isolate failures per backend and drive consecutive-error counters
//!   with proportional backoff
//!
//! A backend whose call fails contributes no results for the attempt but
//! never aborts or delays the others' already-dispatched calls.

use crate::collaborators::FaceCounter;
use crate::config_store::ConfigStore;
use crate::detectors::{Detector, DetectorRegistry};
use crate::error::{Error, Result};
use crate::models::{round2, AttemptOutcome, DetectionEvent, PixelBox, RawResponse};
use crate::normalizer::{self, ActionPolicy};
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Backoff step per consecutive connection failure
const BACKOFF_STEP_SECS: f64 = 0.5;

/// One enabled backend ready to dispatch
struct Dispatchable {
    name: String,
    detector: Arc<dyn Detector>,
    regions: Option<Vec<PixelBox>>,
}

/// FanoutDispatcher instance
pub struct FanoutDispatcher {
    config: Arc<ConfigStore>,
    registry: DetectorRegistry,
    face_counter: Arc<dyn FaceCounter>,
    policy: Arc<dyn ActionPolicy>,
}

impl FanoutDispatcher {
    pub fn new(
        config: Arc<ConfigStore>,
        registry: DetectorRegistry,
        face_counter: Arc<dyn FaceCounter>,
        policy: Arc<dyn ActionPolicy>,
    ) -> Self {
        Self {
            config,
            registry,
            face_counter,
            policy,
        }
    }

    /// Filter configured backends down to the set enabled for this attempt
    async fn enabled_backends(
        &self,
        event: &mut DetectionEvent,
        image_path: &Path,
    ) -> Vec<Dispatchable> {
        let mut enabled = Vec::new();

        for entry in self.config.detectors() {
            let name = entry.name().to_string();
            event.error_counts.entry(name.clone()).or_insert(0);

            let Some(detector) = self.registry.get(&name) else {
                tracing::warn!(detector = %name, "No adapter registered, skipping");
                continue;
            };

            if !entry.allows_camera(&event.camera) {
                tracing::debug!(
                    detector = %name,
                    camera = %event.camera,
                    "Processing skipped, camera not allowed"
                );
                continue;
            }

            let regions = if entry.face_count_required {
                match self.face_counter.count(image_path).await {
                    Ok(faces) if faces.count > 0 => Some(faces.regions),
                    Ok(_) => {
                        tracing::debug!(
                            detector = %name,
                            camera = %event.camera,
                            "Processing skipped, no faces found"
                        );
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(
                            detector = %name,
                            error = %e,
                            "Face count failed, skipping backend"
                        );
                        continue;
                    }
                }
            } else {
                None
            };

            enabled.push(Dispatchable {
                name,
                detector: detector.clone(),
                regions,
            });
        }

        enabled
    }

    /// Run one attempt's fan-out over the processed image.
    ///
    /// All enabled backends are dispatched concurrently; classification
    /// starts only after the full set returns. Connection failures are
    /// folded into per-backend counters and one proportional backoff sleep
    /// before this call returns.
    pub async fn dispatch(
        &self,
        event: &mut DetectionEvent,
        image_path: &Path,
        filename: &str,
        attempt: u32,
    ) -> Vec<AttemptOutcome> {
        let enabled = self.enabled_backends(event, image_path).await;
        if enabled.is_empty() {
            tracing::debug!(camera = %event.camera, "No backends enabled for this attempt");
            return Vec::new();
        }

        let calls = enabled.iter().map(|d| {
            let detector = d.detector.clone();
            let regions = d.regions.clone();
            async move {
                let started = Instant::now();
                let result: Result<RawResponse> = detector
                    .recognize(image_path, regions.as_deref())
                    .await;
                (round2(started.elapsed().as_secs_f64()), result)
            }
        });

        // fan-in barrier: no result is authoritative until the full set is
        // back
        let resolved = join_all(calls).await;

        let detect = self.config.detect_for(&event.camera);
        let mut outcomes = Vec::with_capacity(enabled.len());
        let mut backoff = Duration::ZERO;

        for (d, (duration, result)) in enabled.iter().zip(resolved) {
            let results = match result {
                Ok(raw) => {
                    event.error_counts.insert(d.name.clone(), 0);
                    let predictions = d.detector.normalize(&event.camera, event, &raw);
                    normalizer::classify(&detect, &predictions, self.policy.as_ref())
                }
                Err(e @ Error::ConnectionAborted { .. }) => {
                    let counter = *event
                        .error_counts
                        .entry(d.name.clone())
                        .and_modify(|c| *c += 1)
                        .or_insert(1);
                    let wait = Duration::from_secs_f64(BACKOFF_STEP_SECS * counter as f64);
                    backoff = backoff.max(wait);
                    tracing::error!(
                        detector = %d.name,
                        camera = %event.camera,
                        consecutive_errors = counter,
                        error = %e,
                        "Backend connection aborted"
                    );
                    Vec::new()
                }
                Err(e) => {
                    tracing::error!(
                        detector = %d.name,
                        camera = %event.camera,
                        error = %e,
                        "Backend call failed"
                    );
                    Vec::new()
                }
            };

            outcomes.push(AttemptOutcome {
                detector: d.name.clone(),
                duration,
                attempt,
                results,
                filename: filename.to_string(),
            });
        }

        if backoff > Duration::ZERO {
            tracing::warn!(
                camera = %event.camera,
                seconds = backoff.as_secs_f64(),
                "Backing off after backend connection failures"
            );
            tokio::time::sleep(backoff).await;
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FaceCount, NoFaceCounter};
    use crate::models::{EventKind, RawPrediction};
    use crate::normalizer::NoActionChecks;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted backend for dispatcher tests
    struct MockDetector {
        name: String,
        abort: bool,
        calls: AtomicUsize,
    }

    impl MockDetector {
        fn ok(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                abort: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn aborting(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                abort: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Detector for MockDetector {
        fn name(&self) -> &str {
            &self.name
        }

        async fn recognize(
            &self,
            _image_path: &Path,
            _regions: Option<&[PixelBox]>,
        ) -> Result<RawResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.abort {
                Err(Error::ConnectionAborted {
                    detector: self.name.clone(),
                    message: "connection refused".to_string(),
                })
            } else {
                Ok(RawResponse::new(200, serde_json::json!({})))
            }
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
            vec![RawPrediction {
                confidence: 0.91,
                label: "Alice".to_string(),
                bounding_box: PixelBox::new(0, 0, 50, 50),
            }]
        }
    }

    fn config(entries: serde_json::Value) -> Arc<ConfigStore> {
        let config = serde_json::from_value(serde_json::json!({
            "detectors": entries,
            "cameras": [],
            "detect": {
                "match": { "confidence": 80.0, "min_area": 500 },
                "unknown": { "confidence": 40.0, "save": true }
            }
        }))
        .unwrap();
        Arc::new(ConfigStore::new(config))
    }

    fn dispatcher(
        config: Arc<ConfigStore>,
        registry: DetectorRegistry,
        face_counter: Arc<dyn FaceCounter>,
    ) -> FanoutDispatcher {
        FanoutDispatcher::new(config, registry, face_counter, Arc::new(NoActionChecks))
    }

    #[tokio::test]
    async fn test_failure_on_one_backend_keeps_the_others_results() {
        let config = config(serde_json::json!([
            { "name": "good", "kind": "deepstack", "url": "http://x" },
            { "name": "bad", "kind": "deepstack", "url": "http://y" }
        ]));

        let good = MockDetector::ok("good");
        let bad = MockDetector::aborting("bad");
        let mut registry: DetectorRegistry = DetectorRegistry::new();
        registry.insert("good".to_string(), good.clone());
        registry.insert("bad".to_string(), bad.clone());

        let dispatcher = dispatcher(config, registry, Arc::new(NoFaceCounter));
        let mut event = DetectionEvent::new("garage", "evt-1", EventKind::Triggered);

        let outcomes = dispatcher
            .dispatch(&mut event, Path::new("/tmp/img.jpg"), "m.jpg", 1)
            .await;

        assert_eq!(outcomes.len(), 2);
        let good_outcome = outcomes.iter().find(|o| o.detector == "good").unwrap();
        let bad_outcome = outcomes.iter().find(|o| o.detector == "bad").unwrap();
        assert_eq!(good_outcome.results.len(), 1);
        assert!(good_outcome.results[0].is_match);
        assert!(bad_outcome.results.is_empty());
        assert_eq!(event.error_counts["good"], 0);
        assert_eq!(event.error_counts["bad"], 1);
    }

    #[tokio::test]
    async fn test_counter_grows_then_resets() {
        let config = config(serde_json::json!([
            { "name": "flaky", "kind": "deepstack", "url": "http://x" }
        ]));

        let mut event = DetectionEvent::new("garage", "evt-1", EventKind::Triggered);

        // two consecutive aborts
        let mut registry: DetectorRegistry = DetectorRegistry::new();
        registry.insert("flaky".to_string(), MockDetector::aborting("flaky"));
        let failing = dispatcher(config.clone(), registry, Arc::new(NoFaceCounter));
        failing
            .dispatch(&mut event, Path::new("/tmp/img.jpg"), "m.jpg", 1)
            .await;
        assert_eq!(event.error_counts["flaky"], 1);
        failing
            .dispatch(&mut event, Path::new("/tmp/img.jpg"), "m.jpg", 2)
            .await;
        assert_eq!(event.error_counts["flaky"], 2);

        // one success resets to zero
        let mut registry: DetectorRegistry = DetectorRegistry::new();
        registry.insert("flaky".to_string(), MockDetector::ok("flaky"));
        let healthy = dispatcher(config, registry, Arc::new(NoFaceCounter));
        healthy
            .dispatch(&mut event, Path::new("/tmp/img.jpg"), "m.jpg", 3)
            .await;
        assert_eq!(event.error_counts["flaky"], 0);
    }

    #[tokio::test]
    async fn test_camera_allow_list_skips_backend() {
        let config = config(serde_json::json!([
            { "name": "garage-only", "kind": "deepstack", "url": "http://x", "cameras": ["garage"] }
        ]));

        let detector = MockDetector::ok("garage-only");
        let mut registry: DetectorRegistry = DetectorRegistry::new();
        registry.insert("garage-only".to_string(), detector.clone());

        let dispatcher = dispatcher(config, registry, Arc::new(NoFaceCounter));
        let mut event = DetectionEvent::new("porch", "evt-1", EventKind::Triggered);

        let outcomes = dispatcher
            .dispatch(&mut event, Path::new("/tmp/img.jpg"), "m.jpg", 1)
            .await;

        assert!(outcomes.is_empty());
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_face_count_precheck_skips_without_a_request() {
        let config = config(serde_json::json!([
            { "name": "needs-faces", "kind": "deepstack", "url": "http://x", "face_count_required": true }
        ]));

        let detector = MockDetector::ok("needs-faces");
        let mut registry: DetectorRegistry = DetectorRegistry::new();
        registry.insert("needs-faces".to_string(), detector.clone());

        // NoFaceCounter reports zero faces
        let dispatcher = dispatcher(config, registry, Arc::new(NoFaceCounter));
        let mut event = DetectionEvent::new("garage", "evt-1", EventKind::Triggered);

        let outcomes = dispatcher
            .dispatch(&mut event, Path::new("/tmp/img.jpg"), "m.jpg", 1)
            .await;

        assert!(outcomes.is_empty());
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }

    struct OneFace;

    #[async_trait]
    impl FaceCounter for OneFace {
        async fn count(&self, _image_path: &Path) -> Result<FaceCount> {
            Ok(FaceCount {
                count: 1,
                regions: vec![PixelBox::new(0, 0, 50, 50)],
            })
        }
    }

    #[tokio::test]
    async fn test_face_count_precheck_passes_with_faces() {
        let config = config(serde_json::json!([
            { "name": "needs-faces", "kind": "deepstack", "url": "http://x", "face_count_required": true }
        ]));

        let detector = MockDetector::ok("needs-faces");
        let mut registry: DetectorRegistry = DetectorRegistry::new();
        registry.insert("needs-faces".to_string(), detector.clone());

        let dispatcher = dispatcher(config, registry, Arc::new(OneFace));
        let mut event = DetectionEvent::new("garage", "evt-1", EventKind::Triggered);

        let outcomes = dispatcher
            .dispatch(&mut event, Path::new("/tmp/img.jpg"), "m.jpg", 1)
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);
    }
}
