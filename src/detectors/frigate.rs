//! Frigate adapter
//!
//! Frigate's face endpoint scores one face per request, so recognition
//! posts each supplied face region as its own crop, concurrently. The
//! backend returns no coordinates of its own: boxes come from the crop
//! region when one was used, otherwise from an ordered fallback chain over
//! the event's source metadata. Subjects are Capitalized on train/remove.

use super::{http_client, image_part, jpeg_part, read_response, wire_error, Detector};
use crate::config_store::DetectorEntry;
use crate::error::{Error, Result};
use crate::models::{DetectionEvent, EventMetadata, PixelBox, RawPrediction, RawResponse};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::multipart::Form;
use std::io::Cursor;
use std::path::Path;

/// Ordered extractors for the metadata box fallback chain; first hit wins
const BOX_EXTRACTORS: [fn(&EventMetadata) -> Option<PixelBox>; 3] = [
    |m| m.snapshot.as_ref()?.attributes.as_ref()?.bounding_box,
    |m| m.snapshot.as_ref()?.bounding_box,
    |m| m.bounding_box,
];

/// Resolve the event-metadata bounding box, falling back to the zero box
fn metadata_box(event: &DetectionEvent) -> PixelBox {
    event
        .metadata
        .as_ref()
        .and_then(|m| BOX_EXTRACTORS.iter().find_map(|extract| extract(m)))
        .unwrap_or(PixelBox::ZERO)
}

/// First letter upper-cased, the casing Frigate stores subjects under
fn capitalize(subject: &str) -> String {
    let mut chars = subject.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Frigate backend adapter
pub struct Frigate {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl Frigate {
    pub fn new(entry: &DetectorEntry) -> Self {
        Self {
            name: entry.name().to_string(),
            url: entry.url.trim_end_matches('/').to_string(),
            client: http_client(entry.timeout_secs),
        }
    }

    /// Decode the source image and encode one JPEG crop per region.
    ///
    /// Regions are clamped to the image bounds; decode and re-encode run on
    /// the blocking pool.
    async fn crop_regions(image_path: &Path, regions: Vec<PixelBox>) -> Result<Vec<Vec<u8>>> {
        let path = image_path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let source = image::open(&path)?;
            let (img_w, img_h) = (source.width() as i64, source.height() as i64);

            let mut crops = Vec::with_capacity(regions.len());
            for region in regions {
                let x = region.x_min.clamp(0, (img_w - 1).max(0));
                let y = region.y_min.clamp(0, (img_h - 1).max(0));
                let w = region.width().clamp(1, (img_w - x).max(1)) as u32;
                let h = region.height().clamp(1, (img_h - y).max(1)) as u32;
                let (x, y) = (x as u32, y as u32);

                let mut buf = Cursor::new(Vec::new());
                source
                    .crop_imm(x, y, w, h)
                    .write_to(&mut buf, image::ImageFormat::Jpeg)?;
                crops.push(buf.into_inner());
            }
            Ok::<_, Error>(crops)
        })
        .await
        .map_err(|e| Error::Internal(format!("crop task failed: {}", e)))?
    }

    /// Post one image payload to the recognition endpoint
    async fn recognize_one(&self, part: reqwest::multipart::Part) -> Result<serde_json::Value> {
        let url = format!("{}/api/faces/recognize", self.url);
        let resp = self
            .client
            .post(&url)
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .map_err(|e| wire_error(&self.name, e))?;

        Ok(read_response(&self.name, resp).await?.body)
    }
}

#[async_trait]
impl Detector for Frigate {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recognize(
        &self,
        image_path: &Path,
        regions: Option<&[PixelBox]>,
    ) -> Result<RawResponse> {
        let regions: Vec<PixelBox> = regions.unwrap_or(&[]).to_vec();

        let mut predictions = Vec::new();

        if regions.is_empty() {
            // No pre-detected faces: score the full frame once and let
            // normalize resolve the box from event metadata
            let body = self.recognize_one(image_part(image_path).await?).await?;
            if let (Some(name), Some(score)) = (
                body.get("face_name").and_then(|n| n.as_str()),
                body.get("score").and_then(|s| s.as_f64()),
            ) {
                predictions.push(serde_json::json!({
                    "face_name": name,
                    "score": score,
                }));
            }
        } else {
            let crops = Self::crop_regions(image_path, regions.clone()).await?;

            let calls = crops
                .into_iter()
                .map(|crop| async move { self.recognize_one(jpeg_part(crop)?).await });
            let bodies = join_all(calls)
                .await
                .into_iter()
                .collect::<Result<Vec<_>>>()?;

            for (body, region) in bodies.iter().zip(&regions) {
                let name = body.get("face_name").and_then(|n| n.as_str());
                let score = body.get("score").and_then(|s| s.as_f64());
                if let (Some(name), Some(score)) = (name, score) {
                    predictions.push(serde_json::json!({
                        "face_name": name,
                        "score": score,
                        "box": {
                            "x_min": region.x_min,
                            "y_min": region.y_min,
                            "x_max": region.x_max,
                            "y_max": region.y_max,
                        },
                    }));
                }
            }
        }

        Ok(RawResponse::new(
            200,
            serde_json::json!({ "predictions": predictions }),
        ))
    }

    async fn train(&self, subject: &str, image_path: &Path) -> Result<RawResponse> {
        let url = format!("{}/api/faces/{}/register", self.url, capitalize(subject));
        let form = Form::new().part("file", image_part(image_path).await?);

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| wire_error(&self.name, e))?;

        read_response(&self.name, resp).await
    }

    async fn remove(&self, subject: &str) -> Result<RawResponse> {
        let url = format!("{}/api/faces/{}/delete", self.url, capitalize(subject));

        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| wire_error(&self.name, e))?;

        read_response(&self.name, resp).await
    }

    fn normalize(
        &self,
        camera: &str,
        event: &DetectionEvent,
        raw: &RawResponse,
    ) -> Vec<RawPrediction> {
        let predictions = match raw.body.get("predictions").and_then(|p| p.as_array()) {
            Some(predictions) => predictions,
            None => {
                tracing::warn!(
                    detector = %self.name,
                    camera = %camera,
                    "Unexpected recognition payload, no predictions"
                );
                return Vec::new();
            }
        };

        predictions
            .iter()
            .filter_map(|entry| {
                let bounding_box = entry
                    .get("box")
                    .and_then(super::parse_pixel_box)
                    .unwrap_or_else(|| metadata_box(event));

                Some(RawPrediction {
                    confidence: entry.get("score")?.as_f64()?,
                    label: entry.get("face_name")?.as_str()?.to_string(),
                    bounding_box,
                })
            })
            .collect()
    }
}
