//! DeepStack adapter
//!
//! DeepStack replies with an explicit `success` flag and a `predictions`
//! array carrying box coordinates directly.

use super::{http_client, image_part, read_response, wire_error, Detector};
use crate::config_store::DetectorEntry;
use crate::error::Result;
use crate::models::{DetectionEvent, PixelBox, RawPrediction, RawResponse};
use async_trait::async_trait;
use reqwest::multipart::Form;
use std::path::Path;

/// DeepStack backend adapter
pub struct Deepstack {
    name: String,
    url: String,
    key: Option<String>,
    client: reqwest::Client,
}

impl Deepstack {
    pub fn new(entry: &DetectorEntry) -> Self {
        Self {
            name: entry.name().to_string(),
            url: entry.url.trim_end_matches('/').to_string(),
            key: entry.key.clone(),
            client: http_client(entry.timeout_secs),
        }
    }

    fn with_key(&self, form: Form) -> Form {
        match &self.key {
            Some(key) => form.text("api_key", key.clone()),
            None => form,
        }
    }
}

#[async_trait]
impl Detector for Deepstack {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recognize(
        &self,
        image_path: &Path,
        _regions: Option<&[PixelBox]>,
    ) -> Result<RawResponse> {
        let url = format!("{}/v1/vision/face/recognize", self.url);
        let form = self.with_key(Form::new().part("image", image_part(image_path).await?));

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| wire_error(&self.name, e))?;

        read_response(&self.name, resp).await
    }

    async fn train(&self, subject: &str, image_path: &Path) -> Result<RawResponse> {
        // Subject casing preserved as trained
        let url = format!("{}/v1/vision/face/register", self.url);
        let form = self.with_key(
            Form::new()
                .part("image", image_part(image_path).await?)
                .text("userid", subject.to_string()),
        );

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
        let url = format!("{}/v1/vision/face/delete", self.url);
        let form = self.with_key(Form::new().text("userid", subject.to_string()));

        let resp = self
            .client
            .post(&url)
            .multipart(form)
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
                Some(RawPrediction {
                    confidence: entry.get("confidence")?.as_f64()?,
                    label: entry.get("userid")?.as_str()?.to_string(),
                    bounding_box: super::parse_pixel_box(entry).unwrap_or(PixelBox::ZERO),
                })
            })
            .collect()
    }
}
