//! Error-recovery analyzer: classifies a node failure as retryable or
//! terminal and produces a short rationale for UI retry badges.
//!
//! Primary path asks the provider for a strict-JSON verdict; the keyword
//! heuristic takes over whenever that call fails or returns malformed JSON.

use serde_json::Value;
use tracing::debug;

use crate::provider::{LlmRequest, Provider};

/// Classifier input: everything known about the failure.
pub struct FailureReport<'a> {
    pub node: &'a str,
    pub node_kind: &'a str,
    pub attempt: u32,
    pub max_retries: u32,
    pub error_message: &'a str,
    pub prior_errors: &'a [String],
    pub tool: Option<(&'a str, &'a Value)>,
}

/// Classifier output. `title` ≤ 80 chars and `one_liner` ≤ 60 chars; both
/// are surfaced verbatim in UI retry badges.
#[derive(Debug, Clone)]
pub struct RecoveryVerdict {
    pub should_retry: bool,
    pub title: String,
    pub one_liner: String,
    pub reason: String,
    pub suggestion: String,
}

const TITLE_MAX: usize = 80;
const ONE_LINER_MAX: usize = 60;

/// Asks the provider for a verdict, falling back to [`heuristic`] on any
/// provider or parse failure.
pub async fn analyze(provider: &dyn Provider, report: &FailureReport<'_>) -> RecoveryVerdict {
    let request = LlmRequest::from_instruction(verdict_prompt(report));
    match provider.generate(&request).await {
        Ok(response) => match parse_verdict(&response.text) {
            Some(verdict) => verdict,
            None => {
                debug!(node = %report.node, "analyzer returned malformed JSON, using heuristic");
                heuristic(report)
            }
        },
        Err(e) => {
            debug!(node = %report.node, error = %e, "analyzer call failed, using heuristic");
            heuristic(report)
        }
    }
}

/// Keyword classification used when the model verdict is unavailable.
///
/// Deny retry on auth/config failures; allow on transient transport
/// conditions; otherwise retry while attempts remain.
pub fn heuristic(report: &FailureReport<'_>) -> RecoveryVerdict {
    let lower = report.error_message.to_lowercase();
    let terminal = ["401", "403", "404", "authentication failed", "invalid configuration"];
    let transient = ["429", "503", "timeout", "rate limit", "connection", "parse"];

    let (should_retry, title, suggestion) = if terminal.iter().any(|k| lower.contains(k)) {
        (
            false,
            format!("{} failed: not retryable", report.node),
            "Check credentials and configuration, then run the flow again.".to_string(),
        )
    } else if transient.iter().any(|k| lower.contains(k)) {
        (
            true,
            format!("{} hit a transient error", report.node),
            "Waiting and retrying usually clears this.".to_string(),
        )
    } else {
        (
            report.attempt < report.max_retries,
            format!("{} failed", report.node),
            "Retrying; if it persists, inspect the node's inputs.".to_string(),
        )
    };

    RecoveryVerdict {
        should_retry,
        title: truncate(&title, TITLE_MAX),
        one_liner: truncate(report.error_message, ONE_LINER_MAX),
        reason: report.error_message.to_string(),
        suggestion,
    }
}

/// Verdict for `retry_strategy: simple`: retry unconditionally, no analysis.
pub(crate) fn unconditional(report: &FailureReport<'_>) -> RecoveryVerdict {
    RecoveryVerdict {
        should_retry: true,
        title: truncate(&format!("{} failed, retrying", report.node), TITLE_MAX),
        one_liner: truncate(report.error_message, ONE_LINER_MAX),
        reason: report.error_message.to_string(),
        suggestion: "Retrying unconditionally (simple strategy).".to_string(),
    }
}

fn verdict_prompt(report: &FailureReport<'_>) -> String {
    let mut prompt = format!(
        "A flow step failed. Decide whether retrying can help.\n\
         Step: {} (type {})\nAttempt: {} of {}\nError: {}\n",
        report.node, report.node_kind, report.attempt + 1, report.max_retries + 1,
        report.error_message
    );
    if let Some((tool, args)) = report.tool {
        prompt.push_str(&format!("Tool: {tool} with args {args}\n"));
    }
    if !report.prior_errors.is_empty() {
        prompt.push_str("Earlier errors this step:\n");
        for e in report.prior_errors {
            prompt.push_str(&format!("- {e}\n"));
        }
    }
    prompt.push_str(
        "Respond with strict JSON only, no prose:\n\
         {\"should_retry\": bool, \"title\": \"<=80 chars\", \"one_liner\": \"<=60 chars\", \
         \"reason\": \"...\", \"suggestion\": \"...\"}",
    );
    prompt
}

fn parse_verdict(text: &str) -> Option<RecoveryVerdict> {
    let json = extract_json(text)?;
    let value: Value = serde_json::from_str(&json).ok()?;
    let should_retry = value.get("should_retry")?.as_bool()?;
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Some(RecoveryVerdict {
        should_retry,
        title: truncate(&field("title"), TITLE_MAX),
        one_liner: truncate(&field("one_liner"), ONE_LINER_MAX),
        reason: field("reason"),
        suggestion: field("suggestion"),
    })
}

/// Pulls the first JSON object out of a reply that may carry code fences or
/// prose around it.
pub(crate) fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end_matches("```"))
        .unwrap_or(trimmed);
    let start = body.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in body[start..].char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(body[start..=start + i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
