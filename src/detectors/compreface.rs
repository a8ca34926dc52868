//! CompreFace adapter
//!
//! Talks to CompreFace's recognition service. CompreFace returns the
//! bounding box directly on every result entry and preserves subject
//! casing on train/remove.

use super::{http_client, image_part, read_response, wire_error, Detector};
use crate::config_store::DetectorEntry;
use crate::error::Result;
use crate::models::{DetectionEvent, PixelBox, RawPrediction, RawResponse};
use async_trait::async_trait;
use reqwest::multipart::Form;
use std::path::Path;

/// CompreFace backend adapter
pub struct Compreface {
    name: String,
    url: String,
    key: Option<String>,
    client: reqwest::Client,
}

impl Compreface {
    pub fn new(entry: &DetectorEntry) -> Self {
        Self {
            name: entry.name().to_string(),
            url: entry.url.trim_end_matches('/').to_string(),
            key: entry.key.clone(),
            client: http_client(entry.timeout_secs),
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }
}

#[async_trait]
impl Detector for Compreface {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recognize(
        &self,
        image_path: &Path,
        _regions: Option<&[PixelBox]>,
    ) -> Result<RawResponse> {
        let url = format!("{}/api/v1/recognition/recognize", self.url);
        let form = Form::new().part("file", image_part(image_path).await?);

        let resp = self
            .request(self.client.post(&url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| wire_error(&self.name, e))?;

        read_response(&self.name, resp).await
    }

    async fn train(&self, subject: &str, image_path: &Path) -> Result<RawResponse> {
        // Subject casing preserved as trained
        let url = format!("{}/api/v1/recognition/faces", self.url);
        let form = Form::new().part("file", image_part(image_path).await?);

        let resp = self
            .request(self.client.post(&url).query(&[("subject", subject)]))
            .multipart(form)
            .send()
            .await
            .map_err(|e| wire_error(&self.name, e))?;

        read_response(&self.name, resp).await
    }

    async fn remove(&self, subject: &str) -> Result<RawResponse> {
        let url = format!("{}/api/v1/recognition/faces", self.url);

        let resp = self
            .request(self.client.delete(&url).query(&[("subject", subject)]))
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
        let entries = match raw.body.get("result").and_then(|r| r.as_array()) {
            Some(entries) => entries,
            None => {
                tracing::warn!(
                    detector = %self.name,
                    camera = %camera,
                    status = raw.status,
                    "Unexpected recognition payload, no result entries"
                );
                return Vec::new();
            }
        };

        entries
            .iter()
            .filter_map(|entry| {
                let bounding_box = entry
                    .get("box")
                    .and_then(super::parse_pixel_box)
                    .unwrap_or(PixelBox::ZERO);

                // Subjects come ordered by similarity; an empty list means a
                // face was found but matched nobody trained
                let best = entry
                    .get("subjects")
                    .and_then(|s| s.as_array())
                    .and_then(|s| s.first());

                let (label, confidence) = match best {
                    Some(subject) => (
                        subject.get("subject")?.as_str()?.to_string(),
                        subject.get("similarity")?.as_f64()?,
                    ),
                    None => ("unknown".to_string(), 0.0),
                };

                Some(RawPrediction {
                    confidence,
                    label,
                    bounding_box,
                })
            })
            .collect()
    }
}
