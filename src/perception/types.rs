use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Semantic type reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Text,
    Icon,
    Button,
    Input,
    Link,
    Image,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UIElement {
    /// Unique within one snapshot only.
    pub id: u32,
    #[serde(default)]
    pub content: String,
    /// Normalized bounding box [x1, y1, x2, y2] in range 0.0–1.0
    pub bbox: [f32; 4],
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ElementKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactivity: Option<bool>,
}

impl UIElement {
    pub fn bbox_is_valid(bbox: &[f32; 4]) -> bool {
        let [x1, y1, x2, y2] = *bbox;
        bbox.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)) && x1 <= x2 && y1 <= y2
    }

    /// True when `id` and `content` both match this element.
    pub fn matches(&self, id: u32, content: &str) -> bool {
        self.id == id && self.content == content
    }
}

/// Reference to a screenshot artifact written by the environment driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScreenshotRef {
    pub path: PathBuf,
}

impl ScreenshotRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

impl std::fmt::Display for ScreenshotRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Elements present in only one of two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiDelta {
    pub added: Vec<UIElement>,
    pub removed: Vec<UIElement>,
}

impl UiDelta {
    pub fn between(before: &[UIElement], after: &[UIElement]) -> Self {
        Self {
            added: after.iter().filter(|e| !before.contains(e)).cloned().collect(),
            removed: before.iter().filter(|e| !after.contains(e)).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(id: u32, content: &str) -> UIElement {
        UIElement {
            id,
            content: content.into(),
            bbox: [0.1, 0.1, 0.2, 0.2],
            kind: Some(ElementKind::Text),
            interactivity: None,
        }
    }

    #[test]
    fn bbox_validation() {
        assert!(UIElement::bbox_is_valid(&[0.0, 0.0, 1.0, 1.0]));
        assert!(UIElement::bbox_is_valid(&[0.3, 0.3, 0.3, 0.3]));
        assert!(!UIElement::bbox_is_valid(&[0.5, 0.1, 0.4, 0.2]));
        assert!(!UIElement::bbox_is_valid(&[0.1, 0.1, 1.2, 0.2]));
        assert!(!UIElement::bbox_is_valid(&[f32::NAN, 0.1, 0.2, 0.2]));
    }

    #[test]
    fn unknown_kind_and_missing_fields_deserialize() {
        let e: UIElement =
            serde_json::from_str(r#"{"id": 4, "bbox": [0, 0, 0.5, 0.5], "type": "widget"}"#).unwrap();
        assert_eq!(e.kind, Some(ElementKind::Unknown));
        assert_eq!(e.content, "");
    }

    #[test]
    fn delta_reports_added_and_removed() {
        let before = vec![element(0, "Search"), element(1, "Home")];
        let after = vec![element(0, "Search"), element(1, "Results")];
        let delta = UiDelta::between(&before, &after);
        assert_eq!(delta.added, vec![element(1, "Results")]);
        assert_eq!(delta.removed, vec![element(1, "Home")]);
        assert!(UiDelta::between(&before, &before).is_empty());
    }
}
