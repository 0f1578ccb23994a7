//! Text normalization applied to every oracle response before interpretation.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static OPENING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^```[A-Za-z0-9_+-]*[ \t]*(\r?\n|$)").expect("opening fence regex")
});
static CLOSING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\r?\n|^)```[ \t]*$").expect("closing fence regex"));

/// Remove a surrounding markdown code fence (```` ```lang ... ``` ````) and trim.
///
/// Text without fences is only trimmed. Fences in the middle of the text are
/// left alone.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_open = OPENING_FENCE.replace(trimmed, "");
    let without_close = CLOSING_FENCE.replace(without_open.trim_end(), "");
    without_close.trim().to_string()
}

/// Extract the outermost JSON object from oracle text.
///
/// Fences are stripped first, then everything from the first `{` to the last
/// `}` is parsed. Returns `None` when no object parses.
pub fn extract_json_object(raw: &str) -> Option<Map<String, Value>> {
    let text = strip_code_fences(raw);
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
