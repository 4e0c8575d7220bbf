use async_trait::async_trait;

use crate::errors::CycleResult;
use crate::perception::types::{ScreenshotRef, UIElement};

/// Turns one screenshot into the ordered list of UI elements it shows.
///
/// Fails with `CycleError::Perception` when the detector crashes or the image
/// cannot be read.
#[async_trait]
pub trait Perception: Send + Sync {
    async fn detect(&self, screenshot: &ScreenshotRef) -> CycleResult<Vec<UIElement>>;
}
