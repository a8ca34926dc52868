//! Facebox adapter
//!
//! Facebox takes base64-encoded images over JSON and reports faces with
//! left/top/width/height rects, converted here to pixel boxes.

use super::{http_client, read_response, wire_error, Detector};
use crate::config_store::DetectorEntry;
use crate::error::Result;
use crate::models::{DetectionEvent, PixelBox, RawPrediction, RawResponse};
use async_trait::async_trait;
use base64::Engine;
use std::path::Path;

/// Facebox backend adapter
pub struct Facebox {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl Facebox {
    pub fn new(entry: &DetectorEntry) -> Self {
        Self {
            name: entry.name().to_string(),
            url: entry.url.trim_end_matches('/').to_string(),
            client: http_client(entry.timeout_secs),
        }
    }

    async fn encode(image_path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(image_path).await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

#[async_trait]
impl Detector for Facebox {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recognize(
        &self,
        image_path: &Path,
        _regions: Option<&[PixelBox]>,
    ) -> Result<RawResponse> {
        let url = format!("{}/facebox/check", self.url);
        let body = serde_json::json!({ "base64": Self::encode(image_path).await? });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| wire_error(&self.name, e))?;

        read_response(&self.name, resp).await
    }

    async fn train(&self, subject: &str, image_path: &Path) -> Result<RawResponse> {
        // Subject casing preserved as trained
        let url = format!("{}/facebox/teach", self.url);
        let body = serde_json::json!({
            "base64": Self::encode(image_path).await?,
            "name": subject,
            "id": format!("{}.jpg", subject),
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| wire_error(&self.name, e))?;

        read_response(&self.name, resp).await
    }

    async fn remove(&self, subject: &str) -> Result<RawResponse> {
        let url = format!("{}/facebox/teach/{}.jpg", self.url, subject);

        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| wire_error(&self.name, e))?;

        read_response(&self.name, resp).await
    }

    fn normalize(
        &self,
        camera: &str,
        _event: &DetectionEvent,
        raw: &RawResponse,
    ) -> Vec<RawPrediction> {
        if raw.body.get("success").and_then(|s| s.as_bool()) != Some(true) {
            tracing::warn!(
                detector = %self.name,
                camera = %camera,
                status = raw.status,
                "Recognition reported failure"
            );
            return Vec::new();
        }

        let faces = match raw.body.get("faces").and_then(|f| f.as_array()) {
            Some(faces) => faces,
            None => {
                tracing::warn!(
                    detector = %self.name,
                    camera = %camera,
                    "Unexpected recognition payload, no faces"
                );
                return Vec::new();
            }
        };

        faces
            .iter()
            .filter_map(|face| {
                let rect = face.get("rect")?;
                let left = rect.get("left")?.as_i64()?;
                let top = rect.get("top")?.as_i64()?;
                let width = rect.get("width")?.as_i64()?;
                let height = rect.get("height")?.as_i64()?;

                let matched = face.get("matched").and_then(|m| m.as_bool()).unwrap_or(false);
                let label = if matched {
                    face.get("name")?.as_str()?.to_string()
                } else {
                    "unknown".to_string()
                };

                Some(RawPrediction {
                    confidence: face.get("confidence").and_then(|c| c.as_f64()).unwrap_or(0.0),
                    label,
                    bounding_box: PixelBox::new(left, top, left + width, top + height),
                })
            })
            .collect()
    }
}
