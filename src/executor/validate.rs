use crate::agent_engine::state::{Action, ActionKind};

/// Longest pause a `wait` action may ask for.
pub const MAX_WAIT_SECONDS: f64 = 600.0;

/// Check that `action` carries the fields its kind requires.
///
/// | kind | required |
/// |---|---|
/// | click, double_click, right_click, hover | bbox |
/// | type | bbox, text |
/// | key | key |
/// | scroll, wait | nothing (defaults apply); a wait lasts at most [`MAX_WAIT_SECONDS`] |
pub fn check_fields(action: &Action) -> Result<(), String> {
    if action.kind.needs_target() && action.bbox.is_none() {
        return Err(format!("{} action has no bounding box", action.kind.as_str()));
    }
    match action.kind {
        ActionKind::Type if action.text.is_none() => Err("type action has no text".into()),
        ActionKind::Key if action.key.as_deref().map_or(true, |k| k.trim().is_empty()) => {
            Err("key action has no key".into())
        }
        ActionKind::Wait if !(0.0..=MAX_WAIT_SECONDS).contains(&action.wait_seconds()) => Err(format!(
            "wait of {} seconds is outside 0..={MAX_WAIT_SECONDS}",
            action.wait_seconds()
        )),
        _ => Ok(()),
    }
}
