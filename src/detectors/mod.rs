//! Detectors - Recognition Backend Adapters
//!
//! ## Responsibilities
//!
//! - The `Detector` contract every backend implements: recognize, train,
//!   remove, normalize
//! - Registry construction from configuration
//! - Shared wire plumbing: bounded-timeout clients, multipart upload,
//!   connection-failure mapping
//!
//! Payload-shape knowledge stays inside each adapter; the rest of the
//! system only ever sees the canonical `RawPrediction` shape.

mod compreface;
mod deepstack;
mod facebox;
mod frigate;

pub use compreface::Compreface;
pub use deepstack::Deepstack;
pub use facebox::Facebox;
pub use frigate::Frigate;

use crate::config_store::{DetectorEntry, DetectorKind};
use crate::error::{Error, Result};
use crate::models::{DetectionEvent, PixelBox, RawPrediction, RawResponse};
use async_trait::async_trait;
use reqwest::multipart::Part;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Recognition backend contract.
///
/// `recognize`, `train` and `remove` translate the canonical request into
/// the backend's wire format; `normalize` translates the wire response back
/// into canonical predictions. Adapters carry no per-call mutable state and
/// are safe for concurrent invocation.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Registry key for this backend instance
    fn name(&self) -> &str;

    /// Submit an image (optionally pre-cropped per supplied face regions)
    /// to the backend's recognition endpoint.
    ///
    /// Ordinary HTTP error statuses come back as `RawResponse`; only
    /// connection-level failures (timeout, refused) surface as
    /// `Error::ConnectionAborted`.
    async fn recognize(
        &self,
        image_path: &Path,
        regions: Option<&[PixelBox]>,
    ) -> Result<RawResponse>;

    /// Register a labeled face image under a subject
    async fn train(&self, subject: &str, image_path: &Path) -> Result<RawResponse>;

    /// Delete a previously trained subject
    async fn remove(&self, subject: &str) -> Result<RawResponse>;

    /// Translate a raw backend reply into canonical predictions.
    ///
    /// Malformed or unsuccessful payloads return an empty list with a
    /// warning; absence of predictions is routine, not an error.
    fn normalize(
        &self,
        camera: &str,
        event: &DetectionEvent,
        raw: &RawResponse,
    ) -> Vec<RawPrediction>;
}

/// Registry of configured backends, keyed by backend name
pub type DetectorRegistry = HashMap<String, Arc<dyn Detector>>;

/// Build the backend registry from configuration
pub fn build_registry(entries: &[DetectorEntry]) -> DetectorRegistry {
    let mut registry: DetectorRegistry = HashMap::new();

    for entry in entries {
        let name = entry.name().to_string();
        let detector: Arc<dyn Detector> = match entry.kind {
            DetectorKind::Compreface => Arc::new(Compreface::new(entry)),
            DetectorKind::Deepstack => Arc::new(Deepstack::new(entry)),
            DetectorKind::Facebox => Arc::new(Facebox::new(entry)),
            DetectorKind::Frigate => Arc::new(Frigate::new(entry)),
        };

        if registry.insert(name.clone(), detector).is_some() {
            tracing::warn!(detector = %name, "Duplicate detector name, keeping the last entry");
        }
    }

    tracing::info!(count = registry.len(), "Detector registry built");
    registry
}

/// Build an HTTP client with the backend's bounded request timeout
pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .expect("Failed to create HTTP client")
}

/// Map a reqwest failure at a backend boundary.
///
/// Timeouts and refused connections become `ConnectionAborted` so the
/// dispatcher can drive the backend's consecutive-error counter; anything
/// else is an ordinary HTTP error.
pub(crate) fn wire_error(detector: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::ConnectionAborted {
            detector: detector.to_string(),
            message: e.to_string(),
        }
    } else {
        Error::Http(e)
    }
}

/// Read a response into a `RawResponse`, keeping non-JSON bodies as text
pub(crate) async fn read_response(detector: &str, resp: reqwest::Response) -> Result<RawResponse> {
    let status = resp.status().as_u16();
    let text = resp
        .text()
        .await
        .map_err(|e| wire_error(detector, e))?;

    let body = serde_json::from_str(&text)
        .unwrap_or_else(|_| serde_json::json!({ "raw": text }));

    Ok(RawResponse::new(status, body))
}

/// Multipart file part for an image on disk
pub(crate) async fn image_part(image_path: &Path) -> Result<Part> {
    let bytes = tokio::fs::read(image_path).await?;
    jpeg_part(bytes)
}

/// Multipart part for in-memory JPEG bytes
pub(crate) fn jpeg_part(bytes: Vec<u8>) -> Result<Part> {
    Part::bytes(bytes)
        .file_name("snapshot.jpg")
        .mime_str("image/jpeg")
        .map_err(|e| Error::Internal(format!("multipart build failed: {}", e)))
}

/// Parse a pixel box from the common {x_min, y_min, x_max, y_max} JSON shape
pub(crate) fn parse_pixel_box(value: &serde_json::Value) -> Option<PixelBox> {
    Some(PixelBox::new(
        value.get("x_min")?.as_i64()?,
        value.get("y_min")?.as_i64()?,
        value.get("x_max")?.as_i64()?,
        value.get("y_max")?.as_i64()?,
    ))
}
