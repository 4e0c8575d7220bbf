// Normalized bbox → viewport pixel mapping.
use serde::{Deserialize, Serialize};

use crate::errors::{CycleError, CycleResult};

/// CSS-pixel size of the browser viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Converts a normalized bbox center to viewport pixel coordinates.
///
/// `pixel = normalized_center * viewport_size`, truncated. A point that falls
/// outside the viewport is rejected.
pub fn resolve_target(bbox: &[f32; 4], viewport: Viewport) -> CycleResult<(i64, i64)> {
    let center_x = (bbox[0] + bbox[2]) / 2.0;
    let center_y = (bbox[1] + bbox[3]) / 2.0;

    let x = (center_x as f64 * viewport.width as f64) as i64;
    let y = (center_y as f64 * viewport.height as f64) as i64;

    if !center_x.is_finite()
        || !center_y.is_finite()
        || x < 0
        || y < 0
        || x > viewport.width as i64
        || y > viewport.height as i64
    {
        return Err(CycleError::Execution(format!(
            "target ({x},{y}) outside viewport {}x{}",
            viewport.width, viewport.height
        )));
    }
    Ok((x, y))
}
