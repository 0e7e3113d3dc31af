//! `{variable}` template rendering against session state.
//!
//! A placeholder whose key is missing stays literal; key-not-found is not an
//! error during rendering.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::state::SessionState;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex"));

/// Renders `{key}` placeholders from state. Unknown keys stay literal.
pub(crate) fn render(template: &str, state: &SessionState) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            match state.get(key) {
                Some(value) => value_to_display(&value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Human-facing rendering of a state value: strings stay raw, everything
/// else serializes to JSON.
pub(crate) fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
