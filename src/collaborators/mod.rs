//! Collaborators - External Capability Interfaces
//!
//! ## Responsibilities
//!
//! - Contracts for the capabilities this engine consumes but does not own:
//!   image masking, local face counting, match persistence
//! - Null implementations for wiring and tests
//! - A filesystem match store that links the winning image into a media
//!   directory

use crate::error::{Error, Result};
use crate::models::{AttemptOutcome, DetectionEvent, PixelBox};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Result of applying a camera's mask to an image
#[derive(Debug, Clone)]
pub struct MaskOutcome {
    /// True when the masked image is acceptable as the processed source
    pub visible: bool,
    /// Masked image bytes
    pub buffer: Vec<u8>,
}

/// Applies per-camera masking to a fetched image
#[async_trait]
pub trait ImageMasker: Send + Sync {
    /// None means the camera has no mask configured
    async fn mask(&self, event: &DetectionEvent, image_path: &Path)
        -> Result<Option<MaskOutcome>>;
}

/// Masker for cameras without masks
pub struct NoMasking;

#[async_trait]
impl ImageMasker for NoMasking {
    async fn mask(
        &self,
        _event: &DetectionEvent,
        _image_path: &Path,
    ) -> Result<Option<MaskOutcome>> {
        Ok(None)
    }
}

/// Local face-count result used to pre-filter backends
#[derive(Debug, Clone, Default)]
pub struct FaceCount {
    pub count: usize,
    pub regions: Vec<PixelBox>,
}

/// Counts faces locally before a backend requiring it is dispatched
#[async_trait]
pub trait FaceCounter: Send + Sync {
    async fn count(&self, image_path: &Path) -> Result<FaceCount>;
}

/// Counter for deployments without a local face detector. Reports zero
/// faces, so backends that require a nonzero count are always skipped.
pub struct NoFaceCounter;

#[async_trait]
impl FaceCounter for NoFaceCounter {
    async fn count(&self, _image_path: &Path) -> Result<FaceCount> {
        Ok(FaceCount::default())
    }
}

/// Persists a run's winning image and classified results
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn persist(
        &self,
        event: &DetectionEvent,
        results: &[AttemptOutcome],
        filename: &str,
        image_path: &Path,
    ) -> Result<()>;
}

/// Store that records nothing
pub struct NoMatchStore;

#[async_trait]
impl MatchStore for NoMatchStore {
    async fn persist(
        &self,
        _event: &DetectionEvent,
        _results: &[AttemptOutcome],
        _filename: &str,
        _image_path: &Path,
    ) -> Result<()> {
        Ok(())
    }
}

/// Filesystem match store.
///
/// Hard-links the winning temp image into the media directory under the
/// assigned match filename, falling back to a copy across filesystems, and
/// logs the classified results alongside.
pub struct FileMatchStore {
    media_dir: PathBuf,
}

impl FileMatchStore {
    pub async fn new(media_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(media_dir.join("matches")).await?;
        Ok(Self { media_dir })
    }
}

#[async_trait]
impl MatchStore for FileMatchStore {
    async fn persist(
        &self,
        event: &DetectionEvent,
        results: &[AttemptOutcome],
        filename: &str,
        image_path: &Path,
    ) -> Result<()> {
        let target = self.media_dir.join("matches").join(filename);

        if fs::hard_link(image_path, &target).await.is_err() {
            fs::copy(image_path, &target)
                .await
                .map_err(|e| Error::Persistence(format!("copy to media dir failed: {}", e)))?;
        }

        let summary = serde_json::json!({
            "camera": event.camera,
            "event_id": event.id,
            "kind": event.kind.as_str(),
            "created_at": chrono::Utc::now().to_rfc3339(),
            "results": results,
        });
        let sidecar = target.with_extension("json");
        fs::write(&sidecar, summary.to_string()).await.map_err(|e| {
            Error::Persistence(format!("result sidecar write failed: {}", e))
        })?;

        tracing::info!(
            camera = %event.camera,
            event_id = %event.id,
            filename = %filename,
            "Match persisted"
        );

        Ok(())
    }
}
