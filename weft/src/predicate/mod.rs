//! Sandboxed evaluator for transition conditions.
//!
//! Conditions are small Python-syntax expressions over a single bound
//! variable `x` (the session state as a map): `x["k"]`, `x.get("k")`,
//! comparisons, `in`, `startswith`/`endswith`, `and`/`or`/`not`, literals.
//! A `lambda x:` prefix is accepted and stripped. Evaluation is pure: no
//! I/O, no host access, no attribute reflection. Out-of-grammar input fails
//! with [`PredicateError`], never a crash; the engine treats failures as
//! "condition didn't match".

mod eval;
mod lexer;
mod parser;

use serde_json::{Map, Value};
use thiserror::Error;

use parser::Expr;

/// Error from parsing or evaluating a condition expression.
#[derive(Debug, Error)]
pub enum PredicateError {
    #[error("lex error at {pos}: {message}")]
    Lex { pos: usize, message: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("eval error: {0}")]
    Eval(String),
}

/// A parsed condition, reusable across evaluations.
///
/// **Interaction**: built by the engine when resolving edges; evaluation is
/// side-effect free, so transition resolution stays deterministic (same
/// state, same route).
pub struct Predicate {
    ast: Expr,
}

impl Predicate {
    /// Parses an expression, stripping an optional `lambda x:` prefix.
    pub fn parse(text: &str) -> Result<Self, PredicateError> {
        let body = strip_lambda(text);
        let tokens = lexer::tokenize(body)?;
        let ast = parser::parse(&tokens)?;
        Ok(Self { ast })
    }

    /// Evaluates against a state snapshot, returning Python-style truthiness.
    pub fn evaluate(&self, state: &Map<String, Value>) -> Result<bool, PredicateError> {
        let value = eval::eval(&self.ast, state)?;
        Ok(is_truthy(&value))
    }
}

/// Parse-and-evaluate convenience for one-shot conditions.
pub fn evaluate(text: &str, state: &Map<String, Value>) -> Result<bool, PredicateError> {
    Predicate::parse(text)?.evaluate(state)
}

/// Python truthiness: empty strings/containers, zero, `None`, and `false`
/// are falsy; everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn strip_lambda(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("lambda") {
        let rest = rest.trim_start();
        if let Some(after_var) = rest.strip_prefix('x') {
            if let Some(body) = after_var.trim_start().strip_prefix(':') {
                return body.trim();
            }
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// **Scenario**: Key access and equality route on state values.
    #[test]
    fn equality_on_subscript() {
        let s = state(&[("mode", json!("fast"))]);
        assert!(evaluate("x['mode'] == 'fast'", &s).unwrap());
        assert!(!evaluate("x['mode'] == 'slow'", &s).unwrap());
        assert!(evaluate("x[\"mode\"] != \"slow\"", &s).unwrap());
    }

    /// **Scenario**: x.get with and without a default mirrors dict.get.
    #[test]
    fn get_method_with_default() {
        let s = state(&[("n", json!(2))]);
        assert!(evaluate("x.get('n') == 2", &s).unwrap());
        assert!(evaluate("x.get('missing', 7) == 7", &s).unwrap());
        assert!(!evaluate("x.get('missing')", &s).unwrap(), "None is falsy");
    }

    /// **Scenario**: Comparison operators over numbers.
    #[test]
    fn numeric_comparisons() {
        let s = state(&[("n", json!(5))]);
        for (expr, expected) in [
            ("x['n'] > 3", true),
            ("x['n'] >= 5", true),
            ("x['n'] < 5", false),
            ("x['n'] <= 4", false),
        ] {
            assert_eq!(evaluate(expr, &s).unwrap(), expected, "{expr}");
        }
    }

    /// **Scenario**: Membership over lists and substrings.
    #[test]
    fn membership() {
        let s = state(&[("tags", json!(["a", "b"])), ("msg", json!("hello world"))]);
        assert!(evaluate("'a' in x['tags']", &s).unwrap());
        assert!(!evaluate("'z' in x['tags']", &s).unwrap());
        assert!(evaluate("'world' in x['msg']", &s).unwrap());
        assert!(evaluate("'z' not in x['tags']", &s).unwrap());
    }

    /// **Scenario**: startswith/endswith on string values.
    #[test]
    fn starts_ends_with() {
        let s = state(&[("name", json!("weft-run"))]);
        assert!(evaluate("x['name'].startswith('weft')", &s).unwrap());
        assert!(evaluate("x['name'].endswith('run')", &s).unwrap());
        assert!(!evaluate("x['name'].startswith('run')", &s).unwrap());
    }

    /// **Scenario**: Boolean connectives and not, with Python precedence.
    #[test]
    fn boolean_connectives() {
        let s = state(&[("a", json!(true)), ("b", json!(false))]);
        assert!(evaluate("x['a'] and not x['b']", &s).unwrap());
        assert!(evaluate("x['b'] or x['a']", &s).unwrap());
        assert!(!evaluate("x['a'] and x['b']", &s).unwrap());
        assert!(evaluate("not x['b'] and not x['b'] or x['b']", &s).unwrap());
    }

    /// **Scenario**: lambda prefix is stripped; bare literals evaluate by truthiness.
    #[test]
    fn lambda_prefix_and_literals() {
        let s = state(&[("v", json!(""))]);
        assert!(evaluate("lambda x: x['v'] == ''", &s).unwrap());
        assert!(evaluate("True", &s).unwrap());
        assert!(!evaluate("False", &s).unwrap());
        assert!(!evaluate("None", &s).unwrap());
        assert!(evaluate("'nonempty'", &s).unwrap());
        assert!(!evaluate("0", &s).unwrap());
    }

    /// **Scenario**: None comparison against missing key.
    #[test]
    fn none_comparison() {
        let s = state(&[]);
        assert!(evaluate("x.get('gone') == None", &s).unwrap());
        assert!(!evaluate("x.get('gone') != None", &s).unwrap());
    }

    /// **Scenario**: Out-of-grammar input is a parse error, not a panic.
    #[test]
    fn out_of_grammar_is_error() {
        let s = state(&[]);
        assert!(evaluate("import os", &s).is_err());
        assert!(evaluate("x['k'", &s).is_err());
        assert!(evaluate("__import__('os')", &s).is_err());
        assert!(evaluate("x['a'] ** 2", &s).is_err());
        assert!(evaluate("", &s).is_err());
    }

    /// **Scenario**: Attribute access outside the supported methods is refused.
    #[test]
    fn foreign_attributes_refused() {
        let s = state(&[("k", json!("v"))]);
        assert!(evaluate("x.__class__", &s).is_err());
        assert!(evaluate("x['k'].upper()", &s).is_err());
    }

    /// **Scenario**: Truthiness of empty vs non-empty containers.
    #[test]
    fn container_truthiness() {
        let s = state(&[("empty", json!([])), ("full", json!([1]))]);
        assert!(!evaluate("x['empty']", &s).unwrap());
        assert!(evaluate("x['full']", &s).unwrap());
    }
}
