//! Option expansion for input nodes.
//!
//! Each option string resolves against state: a key holding a list of
//! strings spreads into choices; a list of other values stringifies each
//! item; a newline-separated string yields its numbered lines (LLM preambles
//! are noise and get filtered out); a plain string value is one choice.
//! Literal strings that match no key are kept verbatim.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::template::value_to_display;
use crate::state::SessionState;

/// `<number>:<rest>` shaped lines (also accepts `1.` / `1)` numbering).
static NUMBERED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+\s*[.:)]\s*\S").expect("numbered-line regex"));

pub(crate) fn expand_options(options: &[String], state: &SessionState) -> Vec<String> {
    let mut out = Vec::new();
    for option in options {
        match state.get(option) {
            Some(Value::Array(items)) => {
                for item in items {
                    out.push(value_to_display(&item));
                }
            }
            Some(Value::String(s)) if s.contains('\n') => {
                for line in s.lines() {
                    if NUMBERED_LINE.is_match(line) {
                        out.push(line.trim().to_string());
                    }
                }
            }
            Some(Value::String(s)) => {
                if !s.is_empty() {
                    out.push(s);
                }
            }
            Some(other) => out.push(value_to_display(&other)),
            None => out.push(option.clone()),
        }
    }
    out
}
