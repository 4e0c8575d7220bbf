//! Client for an OmniParser-style detection server.
//!
//! The screenshot is decoded locally first so unreadable files fail fast,
//! then uploaded as base64; the server answers with a list of parsed
//! elements carrying normalized boxes.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::config::PerceptionConfig;
use crate::errors::{CycleError, CycleResult};
use crate::perception::traits::Perception;
use crate::perception::types::{ElementKind, ScreenshotRef, UIElement};

pub struct OmniParserClient {
    endpoint: String,
    config: PerceptionConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ParseRequest {
    base64_image: String,
    box_threshold: f32,
    iou_threshold: f32,
    use_paddleocr: bool,
    imgsz: u32,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    #[serde(alias = "parsed_content_list", default)]
    elements: Vec<RawElement>,
}

#[derive(Debug, Deserialize)]
struct RawElement {
    #[serde(rename = "type", default)]
    kind: Option<ElementKind>,
    bbox: Vec<f32>,
    #[serde(default)]
    interactivity: Option<bool>,
    #[serde(default)]
    content: Option<String>,
}

impl OmniParserClient {
    pub fn new(config: PerceptionConfig) -> CycleResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            config,
            client,
        })
    }

    async fn encode_checked(&self, screenshot: &ScreenshotRef) -> CycleResult<String> {
        let bytes = screenshot.read_bytes().await.map_err(|e| {
            CycleError::Perception(format!("cannot read screenshot {screenshot}: {e}"))
        })?;
        let bytes = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&bytes)
                .map(|img| {
                    tracing::debug!(width = img.width(), height = img.height(), "screenshot decoded");
                    bytes
                })
                .map_err(|e| CycleError::Perception(format!("unreadable image: {e}")))
        })
        .await
        .map_err(|e| CycleError::Perception(format!("join: {e}")))??;
        Ok(base64::engine::general_purpose::STANDARD.encode(&bytes))
    }
}

#[async_trait]
impl Perception for OmniParserClient {
    async fn detect(&self, screenshot: &ScreenshotRef) -> CycleResult<Vec<UIElement>> {
        let base64_image = self.encode_checked(screenshot).await?;
        let body = ParseRequest {
            base64_image,
            box_threshold: self.config.box_threshold,
            iou_threshold: self.config.iou_threshold,
            use_paddleocr: self.config.use_paddleocr,
            imgsz: self.config.imgsz,
        };

        let url = format!("{}/parse/", self.endpoint);
        tracing::debug!(url = %url, screenshot = %screenshot, "sending perception request");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CycleError::Perception(format!("detector unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(CycleError::Perception(format!("{status}: {err_body}")));
        }

        let parsed: ParseResponse = response
            .json()
            .await
            .map_err(|e| CycleError::Perception(format!("bad detector response: {e}")))?;
        let elements = into_elements(parsed.elements);
        tracing::info!(count = elements.len(), screenshot = %screenshot, "perception complete");
        Ok(elements)
    }
}

/// Assign snapshot-local ids in detector order, dropping malformed boxes.
fn into_elements(raw: Vec<RawElement>) -> Vec<UIElement> {
    let mut elements = Vec::with_capacity(raw.len());
    for (idx, r) in raw.into_iter().enumerate() {
        let bbox: [f32; 4] = match r.bbox.as_slice().try_into() {
            Ok(b) => b,
            Err(_) => {
                tracing::warn!(index = idx, len = r.bbox.len(), "element bbox is not 4 values, dropped");
                continue;
            }
        };
        if !UIElement::bbox_is_valid(&bbox) {
            tracing::warn!(index = idx, ?bbox, "element bbox out of range, dropped");
            continue;
        }
        elements.push(UIElement {
            id: idx as u32,
            content: r.content.unwrap_or_default().trim().to_string(),
            bbox,
            kind: r.kind,
            interactivity: r.interactivity,
        });
    }
    elements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_content_list_is_accepted_and_ids_follow_order() {
        let json = r#"{
            "parsed_content_list": [
                {"type": "text", "bbox": [0.1, 0.1, 0.3, 0.2], "interactivity": false, "content": " Search Amazon "},
                {"type": "icon", "bbox": [0.5, 0.5, 0.4, 0.6], "interactivity": true, "content": "cart"},
                {"type": "icon", "bbox": [0.6, 0.6, 0.7, 0.7], "interactivity": true, "content": "menu"}
            ],
            "latency": 1.2
        }"#;
        let parsed: ParseResponse = serde_json::from_str(json).unwrap();
        let elements = into_elements(parsed.elements);

        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].id, 0);
        assert_eq!(elements[0].content, "Search Amazon");
        // the inverted box at index 1 is dropped, ids keep detector positions
        assert_eq!(elements[1].id, 2);
        assert_eq!(elements[1].kind, Some(ElementKind::Icon));
    }

    #[test]
    fn short_bbox_is_dropped() {
        let parsed: ParseResponse =
            serde_json::from_str(r#"{"elements": [{"bbox": [0.1, 0.2, 0.3]}]}"#).unwrap();
        assert!(into_elements(parsed.elements).is_empty());
    }

    #[tokio::test]
    async fn unreadable_screenshot_fails_before_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();

        let client = OmniParserClient::new(PerceptionConfig {
            endpoint: "http://127.0.0.1:9".into(),
            ..PerceptionConfig::default()
        })
        .unwrap();
        let err = client.detect(&ScreenshotRef::new(&path)).await.unwrap_err();
        assert!(matches!(err, CycleError::Perception(ref m) if m.contains("unreadable image")), "{err}");
    }
}
