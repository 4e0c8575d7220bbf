// Key names from the actor → DevTools key definitions.
use chromiumoxide::keys::{self, KeyDefinition};

/// How a `key` action reaches the page.
pub enum KeyInput {
    /// One key press with a US-layout definition.
    Press(&'static KeyDefinition),
    /// Anything without a definition is inserted as literal text.
    Text(String),
}

/// Accept the spellings planners tend to use (`enter`, `arrow_down`, `Page Up`).
fn canonical_name(key: &str) -> Option<&'static str> {
    let normalized = key.trim().to_ascii_lowercase().replace(['_', ' ', '-'], "");
    let name = match normalized.as_str() {
        "enter" | "return" => "Enter",
        "tab" => "Tab",
        "escape" | "esc" => "Escape",
        "backspace" => "Backspace",
        "delete" | "del" => "Delete",
        "space" => " ",
        "arrowup" | "up" => "ArrowUp",
        "arrowdown" | "down" => "ArrowDown",
        "arrowleft" | "left" => "ArrowLeft",
        "arrowright" | "right" => "ArrowRight",
        "pageup" => "PageUp",
        "pagedown" => "PageDown",
        "home" => "Home",
        "end" => "End",
        _ => return None,
    };
    Some(name)
}

pub fn classify(key: &str) -> KeyInput {
    let lookup = canonical_name(key).unwrap_or_else(|| key.trim());
    keys::get_key_definition(lookup)
        .or_else(|| {
            keys::USKEYBOARD_LAYOUT
                .iter()
                .find(|definition| definition.key.eq_ignore_ascii_case(lookup))
        })
        .map_or_else(|| KeyInput::Text(key.to_string()), KeyInput::Press)
}
