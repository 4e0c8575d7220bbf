//! Pulls a JSON value out of free-form model output.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("fence pattern"))
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fences(text: &str) -> &str {
    match fence_re().captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => text.trim(),
    }
}

/// Parse model output as JSON.
///
/// Fences are stripped first; if the remainder is still not valid JSON the
/// outermost `{...}` or `[...]` span is tried.
pub fn extract_json(text: &str) -> Result<Value, String> {
    let body = strip_code_fences(text);
    if body.is_empty() {
        return Err("empty response".into());
    }
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(first) => outermost_span(body)
            .and_then(|span| serde_json::from_str(span).ok())
            .ok_or_else(|| format!("not valid JSON: {first}")),
    }
}

fn outermost_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_is_unwrapped() {
        let text = "```json\n[{\"step\": \"open\"}]\n```";
        assert_eq!(strip_code_fences(text), "[{\"step\": \"open\"}]");
        let value = extract_json(text).unwrap();
        assert_eq!(value[0]["step"], "open");
    }

    #[test]
    fn bare_fence_and_plain_text() {
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn prose_around_object_is_tolerated() {
        let value = extract_json("Here is the action: {\"id\": 3, \"action\": \"click\"} good luck").unwrap();
        assert_eq!(value["id"], 3);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(extract_json("").is_err());
        assert!(extract_json("I cannot help with that").is_err());
        assert!(extract_json("{ broken").is_err());
    }
}
