//! AST evaluation over a state snapshot.

use serde_json::{Map, Number, Value};

use super::parser::{CmpOp, Expr, Method};
use super::{is_truthy, PredicateError};

pub(super) fn eval(expr: &Expr, state: &Map<String, Value>) -> Result<Value, PredicateError> {
    match expr {
        Expr::State => Ok(Value::Object(state.clone())),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Num(n) => Number::from_f64(*n)
            .map(Value::Number)
            .ok_or_else(|| err("non-finite number")),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::None => Ok(Value::Null),
        Expr::Subscript(target, index) => {
            let target = eval(target, state)?;
            let index = eval(index, state)?;
            subscript(&target, &index)
        }
        Expr::MethodCall(receiver, method, args) => {
            let receiver = eval(receiver, state)?;
            let args: Vec<Value> = args
                .iter()
                .map(|a| eval(a, state))
                .collect::<Result<_, _>>()?;
            method_call(&receiver, method, &args)
        }
        Expr::Compare(left, op, right) => {
            let left = eval(left, state)?;
            let right = eval(right, state)?;
            compare(&left, op, &right).map(Value::Bool)
        }
        Expr::And(left, right) => {
            let l = eval(left, state)?;
            if !is_truthy(&l) {
                return Ok(l);
            }
            eval(right, state)
        }
        Expr::Or(left, right) => {
            let l = eval(left, state)?;
            if is_truthy(&l) {
                return Ok(l);
            }
            eval(right, state)
        }
        Expr::Not(inner) => {
            let v = eval(inner, state)?;
            Ok(Value::Bool(!is_truthy(&v)))
        }
    }
}

fn subscript(target: &Value, index: &Value) -> Result<Value, PredicateError> {
    match (target, index) {
        (Value::Object(map), Value::String(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| err(&format!("key '{key}' not found"))),
        (Value::Array(items), Value::Number(n)) => {
            let idx = n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as usize)
                .ok_or_else(|| err("list index must be a non-negative integer"))?;
            items
                .get(idx)
                .cloned()
                .ok_or_else(|| err("list index out of range"))
        }
        _ => Err(err("subscript requires map[str] or list[int]")),
    }
}

fn method_call(receiver: &Value, method: &Method, args: &[Value]) -> Result<Value, PredicateError> {
    match method {
        Method::Get => {
            let map = receiver
                .as_object()
                .ok_or_else(|| err(".get() requires a map"))?;
            let key = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| err(".get() requires a string key"))?;
            let default = args.get(1).cloned().unwrap_or(Value::Null);
            Ok(map.get(key).cloned().unwrap_or(default))
        }
        Method::StartsWith | Method::EndsWith => {
            let s = receiver
                .as_str()
                .ok_or_else(|| err("startswith/endswith require a string"))?;
            let needle = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| err("startswith/endswith require a string argument"))?;
            Ok(Value::Bool(match method {
                Method::StartsWith => s.starts_with(needle),
                _ => s.ends_with(needle),
            }))
        }
    }
}

fn compare(left: &Value, op: &CmpOp, right: &Value) -> Result<bool, PredicateError> {
    match op {
        CmpOp::Eq => Ok(values_equal(left, right)),
        CmpOp::Ne => Ok(!values_equal(left, right)),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => contains(right, left).map(|b| !b),
        CmpOp::Lt | CmpOp::Gt | CmpOp::Le | CmpOp::Ge => {
            let ordering = order(left, right)?;
            Ok(match op {
                CmpOp::Lt => ordering == std::cmp::Ordering::Less,
                CmpOp::Gt => ordering == std::cmp::Ordering::Greater,
                CmpOp::Le => ordering != std::cmp::Ordering::Greater,
                CmpOp::Ge => ordering != std::cmp::Ordering::Less,
                _ => unreachable!(),
            })
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Result<std::cmp::Ordering, PredicateError> {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return a
            .partial_cmp(&b)
            .ok_or_else(|| err("numbers are unordered"));
    }
    if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
        return Ok(a.cmp(b));
    }
    Err(err("ordering requires two numbers or two strings"))
}

/// Membership: `needle in haystack` for lists (element equality), strings
/// (substring), and maps (key presence).
fn contains(haystack: &Value, needle: &Value) -> Result<bool, PredicateError> {
    match haystack {
        Value::Array(items) => Ok(items.iter().any(|v| values_equal(v, needle))),
        Value::String(s) => {
            let sub = needle
                .as_str()
                .ok_or_else(|| err("'in <string>' requires a string"))?;
            Ok(s.contains(sub))
        }
        Value::Object(map) => {
            let key = needle
                .as_str()
                .ok_or_else(|| err("'in <map>' requires a string key"))?;
            Ok(map.contains_key(key))
        }
        _ => Err(err("'in' requires a list, string, or map")),
    }
}

fn err(message: &str) -> PredicateError {
    PredicateError::Eval(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: Missing key via subscript errors (engine maps to false),
    /// while .get() yields None.
    #[test]
    fn missing_key_subscript_errors() {
        let state = Map::new();
        let r = crate::predicate::evaluate("x['gone'] == 'v'", &state);
        assert!(r.is_err());
        assert!(!crate::predicate::evaluate("x.get('gone')", &state).unwrap());
    }

    /// **Scenario**: Integer and float state values compare equal by number.
    #[test]
    fn numeric_equality_across_int_float() {
        let mut state = Map::new();
        state.insert("n".into(), json!(2));
        assert!(crate::predicate::evaluate("x['n'] == 2.0", &state).unwrap());
    }

    /// **Scenario**: Ordering across mismatched types is an eval error.
    #[test]
    fn mismatched_ordering_errors() {
        let mut state = Map::new();
        state.insert("s".into(), json!("abc"));
        assert!(crate::predicate::evaluate("x['s'] < 3", &state).is_err());
    }

    /// **Scenario**: 'in' over maps tests key presence.
    #[test]
    fn in_over_map_keys() {
        let mut state = Map::new();
        state.insert("m".into(), json!({"k": 1}));
        assert!(crate::predicate::evaluate("'k' in x['m']", &state).unwrap());
        assert!(!crate::predicate::evaluate("'z' in x['m']", &state).unwrap());
    }

    /// **Scenario**: and/or return operand values Python-style before truthiness.
    #[test]
    fn short_circuit_returns_operand() {
        let mut state = Map::new();
        state.insert("empty".into(), json!(""));
        state.insert("full".into(), json!("v"));
        // `'' or 'v'` is 'v' (truthy); `'' and 'v'` is '' (falsy).
        assert!(crate::predicate::evaluate("x['empty'] or x['full']", &state).unwrap());
        assert!(!crate::predicate::evaluate("x['empty'] and x['full']", &state).unwrap());
    }
}
