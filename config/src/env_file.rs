//! Project `.env` loading: one assignment per line, applied (without
//! overwriting) in lib.
//!
//! Accepted lines look like `KEY=value` or `export KEY=value`; keys are
//! restricted to `[A-Za-z0-9_]`. Everything else (comments, blanks,
//! malformed lines) is silently skipped so a hand-edited file never aborts
//! startup.

use std::collections::HashMap;
use std::io;
use std::path::Path;

/// Parses a single line into an assignment, or `None` when the line carries
/// no usable key/value pair.
fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim_start();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    // Shell-style `export KEY=...` is tolerated so files can be sourced too.
    let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
    let eq = line.find('=')?;
    let key = line[..eq].trim_end();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((key.to_string(), unquote(line[eq + 1..].trim())))
}

/// Strips one matching pair of surrounding quotes. Double quotes honor the
/// `\"` escape; single quotes are taken literally; anything else passes
/// through unchanged (a `#` inside an unquoted value is kept).
fn unquote(raw: &str) -> String {
    if raw.len() >= 2 {
        if raw.starts_with('"') && raw.ends_with('"') {
            return raw[1..raw.len() - 1].replace("\\\"", "\"");
        }
        if raw.starts_with('\'') && raw.ends_with('\'') {
            return raw[1..raw.len() - 1].to_string();
        }
    }
    raw.to_string()
}

/// Reads `.env` from `dir` (or the current directory) into a map. A missing
/// file is not an error; later assignments to the same key win.
pub fn read(dir: Option<&Path>) -> io::Result<HashMap<String, String>> {
    let Some(base) = dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
    else {
        return Ok(HashMap::new());
    };
    match std::fs::read_to_string(base.join(".env")) {
        Ok(text) => Ok(text.lines().filter_map(parse_line).collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(e),
    }
}
