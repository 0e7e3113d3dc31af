//! XML-tagged tool-call intent detection in streamed text.
//!
//! Some models narrate tool use as XML instead of emitting native function
//! calls. The scanner buffers streamed text (tags arrive token-fragmented)
//! and reports an intent once a complete, structurally anchored block is
//! present. Accepted anchors: `<invoke name="T">…</invoke>` (optionally
//! inside `<function_calls>`), and `<tool_use>…<tool_name>T</tool_name>…
//! </tool_use>`. A bare `<T>` tag in prose is not an intent.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// One detected tool-call intent.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolIntent {
    pub name: String,
    pub args: Map<String, Value>,
}

static INVOKE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<invoke\s+name="([^"]+)"\s*>(.*?)</invoke>"#).expect("invoke regex")
});
static TOOL_USE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<tool_use>(.*?)</tool_use>").expect("tool_use regex"));
static TOOL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<tool_name>(.*?)</tool_name>").expect("tool_name regex"));
static PARAMETER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<parameter\s+name="([^"]+)"\s*>(.*?)</parameter>"#).expect("parameter regex")
});
static CHILD_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<([A-Za-z_][A-Za-z0-9_]*)>(.*?)</([A-Za-z_][A-Za-z0-9_]*)>")
        .expect("child tag regex")
});

/// Incremental scanner over streamed model text.
///
/// `push` appends a fragment and returns the first complete intent whose
/// tool name is known. Consumed blocks are removed from the buffer so one
/// invocation is reported once.
pub struct IntentScanner {
    known_tools: Vec<String>,
    buffer: String,
}

impl IntentScanner {
    pub fn new(known_tools: Vec<String>) -> Self {
        Self {
            known_tools,
            buffer: String::new(),
        }
    }

    pub fn push(&mut self, fragment: &str) -> Option<ToolIntent> {
        self.buffer.push_str(fragment);
        self.scan()
    }

    fn scan(&mut self) -> Option<ToolIntent> {
        loop {
            let (intent, consumed_end) = self.first_complete_block()?;
            self.buffer.drain(..consumed_end);
            if let Some(intent) = intent {
                return Some(intent);
            }
            // Unknown tool: block dropped, keep scanning what remains.
        }
    }

    /// Finds the earliest complete anchored block. Returns the parsed intent
    /// (None when the named tool is unknown) and the buffer offset to drop.
    fn first_complete_block(&self) -> Option<(Option<ToolIntent>, usize)> {
        let invoke = INVOKE_BLOCK.captures(&self.buffer);
        let tool_use = TOOL_USE_BLOCK.captures(&self.buffer);

        let invoke_start = invoke
            .as_ref()
            .and_then(|c| c.get(0))
            .map(|m| m.start())
            .unwrap_or(usize::MAX);
        let tool_use_start = tool_use
            .as_ref()
            .and_then(|c| c.get(0))
            .map(|m| m.start())
            .unwrap_or(usize::MAX);

        if invoke_start <= tool_use_start {
            let caps = invoke?;
            let whole = caps.get(0)?;
            let name = caps[1].trim().to_string();
            let body = caps[2].to_string();
            let intent = self
                .known(&name)
                .then(|| ToolIntent {
                    name,
                    args: parse_parameters(&body),
                });
            Some((intent, whole.end()))
        } else {
            let caps = tool_use?;
            let whole = caps.get(0)?;
            let body = caps[1].to_string();
            // A tool_use block without a tool_name is dropped, not retained.
            let Some(name_caps) = TOOL_NAME.captures(&body) else {
                return Some((None, whole.end()));
            };
            let name = name_caps[1].trim().to_string();
            let intent = self.known(&name).then(|| ToolIntent {
                name,
                args: parse_tool_use_args(&body),
            });
            Some((intent, whole.end()))
        }
    }

    fn known(&self, name: &str) -> bool {
        self.known_tools.iter().any(|t| t == name)
    }
}

/// `<parameter name="k">v</parameter>` pairs.
fn parse_parameters(body: &str) -> Map<String, Value> {
    let mut args = Map::new();
    for caps in PARAMETER.captures_iter(body) {
        args.insert(caps[1].to_string(), parse_value(&caps[2]));
    }
    args
}

/// Inside `<tool_use>`: either `<parameter name=…>` pairs or direct
/// `<k>v</k>` children (excluding the `tool_name` tag itself).
fn parse_tool_use_args(body: &str) -> Map<String, Value> {
    let explicit = parse_parameters(body);
    if !explicit.is_empty() {
        return explicit;
    }
    let mut args = Map::new();
    for caps in CHILD_TAG.captures_iter(body) {
        let (open, close) = (&caps[1], &caps[3]);
        if open != close || open == "tool_name" || open == "parameters" {
            continue;
        }
        args.insert(open.to_string(), parse_value(&caps[2]));
    }
    args
}

/// Values parse as JSON when possible, else stay strings.
fn parse_value(text: &str) -> Value {
    let trimmed = text.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scanner() -> IntentScanner {
        IntentScanner::new(vec!["search".into(), "fetch".into()])
    }

    /// **Scenario**: A complete invoke block parses name and parameters.
    #[test]
    fn invoke_block_parses() {
        let mut s = scanner();
        let intent = s
            .push(r#"<invoke name="search"><parameter name="q">weather</parameter><parameter name="limit">3</parameter></invoke>"#)
            .expect("intent");
        assert_eq!(intent.name, "search");
        assert_eq!(intent.args["q"], json!("weather"));
        assert_eq!(intent.args["limit"], json!(3));
    }

    /// **Scenario**: Token-fragmented streams report nothing until the
    /// closing tag arrives.
    #[test]
    fn fragmented_stream_waits_for_close() {
        let mut s = scanner();
        assert!(s.push("<invoke na").is_none());
        assert!(s.push("me=\"search\"><param").is_none());
        assert!(s.push("eter name=\"q\">rust</parameter>").is_none());
        let intent = s.push("</invoke>").expect("intent after close");
        assert_eq!(intent.args["q"], json!("rust"));
    }

    /// **Scenario**: tool_use form with tool_name and direct child args.
    #[test]
    fn tool_use_block_parses() {
        let mut s = scanner();
        let intent = s
            .push("<tool_use><tool_name>fetch</tool_name><url>http://x</url></tool_use>")
            .expect("intent");
        assert_eq!(intent.name, "fetch");
        assert_eq!(intent.args["url"], json!("http://x"));
    }

    /// **Scenario**: A bare known-tool tag without a structural anchor is
    /// not an intent (prose protection).
    #[test]
    fn bare_tag_is_not_an_intent() {
        let mut s = scanner();
        assert!(s
            .push("I would use <search>weather</search> here.")
            .is_none());
    }

    /// **Scenario**: Unknown tool names are skipped; a later known block in
    /// the same buffer is still found.
    #[test]
    fn unknown_tool_skipped() {
        let mut s = scanner();
        let text = r#"<invoke name="mystery"><parameter name="a">1</parameter></invoke><invoke name="search"><parameter name="q">x</parameter></invoke>"#;
        let intent = s.push(text).expect("second block is known");
        assert_eq!(intent.name, "search");
    }

    /// **Scenario**: A consumed block is reported once; the same call again
    /// later is a new intent.
    #[test]
    fn consumed_block_not_repeated() {
        let mut s = scanner();
        let block = r#"<invoke name="search"><parameter name="q">a</parameter></invoke>"#;
        assert!(s.push(block).is_some());
        assert!(s.push("").is_none(), "already consumed");
        assert!(s.push(block).is_some(), "fresh block is a fresh intent");
    }

    /// **Scenario**: function_calls wrapper around invoke still parses (the
    /// anchor is the invoke element).
    #[test]
    fn function_calls_wrapper() {
        let mut s = scanner();
        let intent = s
            .push(r#"<function_calls><invoke name="search"><parameter name="q">x</parameter></invoke></function_calls>"#)
            .expect("intent");
        assert_eq!(intent.name, "search");
    }
}
