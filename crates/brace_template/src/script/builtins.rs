//! Built-in directive functions.
//!
//! Each function receives already-evaluated arguments. `isset` and `empty`
//! need their arguments unevaluated and are handled by the interpreter.

use serde_json::Value;

use super::value::{to_num, to_output, type_name};

/// Upper bound on the number of elements `range()` may produce.
const MAX_RANGE_LEN: i64 = 1_000_000;

/// Dispatch a built-in function call.
///
/// Returns `None` if `name` is not a built-in.
pub fn call_builtin(name: &str, args: Vec<Value>) -> Option<Result<Value, String>> {
    fn inner(name: &str, args: Vec<Value>) -> Result<Option<Value>, String> {
        Ok(Some(match name {
            "count" => {
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    Value::Array(items) => Value::from(items.len()),
                    Value::Object(map) => Value::from(map.len()),
                    other => {
                        return Err(format!(
                            "count(): Argument #1 must be of type array|object, {} given",
                            type_name(other)
                        ))
                    }
                }
            }
            "len" => {
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    Value::Array(items) => Value::from(items.len()),
                    Value::Object(map) => Value::from(map.len()),
                    other => Value::from(to_output(other).chars().count()),
                }
            }
            "upper" => {
                arity(name, &args, 1, 1)?;
                Value::String(to_output(&args[0]).to_uppercase())
            }
            "lower" => {
                arity(name, &args, 1, 1)?;
                Value::String(to_output(&args[0]).to_lowercase())
            }
            "trim" => {
                arity(name, &args, 1, 1)?;
                Value::String(to_output(&args[0]).trim().to_string())
            }
            "escape" | "e" => {
                arity(name, &args, 1, 1)?;
                Value::String(escape_html(&to_output(&args[0])))
            }
            "json" => {
                arity(name, &args, 1, 1)?;
                Value::String(args[0].to_string())
            }
            "range" => {
                arity(name, &args, 2, 3)?;
                range(&args)?
            }
            "join" => {
                arity(name, &args, 2, 2)?;
                let sep = to_output(&args[0]);
                let parts: Vec<String> = match &args[1] {
                    Value::Array(items) => items.iter().map(to_output).collect(),
                    Value::Object(map) => map.values().map(to_output).collect(),
                    other => {
                        return Err(format!(
                            "join(): Argument #2 must be of type array, {} given",
                            type_name(other)
                        ))
                    }
                };
                Value::String(parts.join(&sep))
            }
            "keys" => {
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    Value::Array(items) => (0..items.len()).map(Value::from).collect(),
                    Value::Object(map) => map.keys().cloned().map(Value::String).collect(),
                    other => {
                        return Err(format!(
                            "keys(): Argument #1 must be of type array|object, {} given",
                            type_name(other)
                        ))
                    }
                }
            }
            _ => return Ok(None),
        }))
    }
    inner(&name.to_ascii_lowercase(), args).transpose()
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), String> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        min.to_string()
    } else {
        format!("{min} to {max}")
    };
    Err(format!(
        "{name}() expects {expected} argument(s), {} given",
        args.len()
    ))
}

fn int_arg(args: &[Value], idx: usize) -> Result<i64, String> {
    to_num(&args[idx])
        .map(|n| n.as_i64())
        .ok_or_else(|| {
            format!(
                "range(): Argument #{} must be a number, {} given",
                idx + 1,
                type_name(&args[idx])
            )
        })
}

/// Inclusive integer range, counting down when `end < start`.
fn range(args: &[Value]) -> Result<Value, String> {
    let start = int_arg(args, 0)?;
    let end = int_arg(args, 1)?;
    let step = if args.len() == 3 {
        int_arg(args, 2)?.checked_abs().unwrap_or(0)
    } else {
        1
    };
    if step == 0 {
        return Err("range(): Argument #3 must not be zero".to_string());
    }

    let span = (i128::from(end) - i128::from(start)).unsigned_abs();
    if span / step as u128 >= MAX_RANGE_LEN as u128 {
        return Err(format!(
            "range(): would produce more than {MAX_RANGE_LEN} elements"
        ));
    }

    let mut items = Vec::new();
    let mut current = start;
    if start <= end {
        while current <= end {
            items.push(Value::from(current));
            match current.checked_add(step) {
                Some(next) => current = next,
                None => break,
            }
        }
    } else {
        while current >= end {
            items.push(Value::from(current));
            match current.checked_sub(step) {
                Some(next) => current = next,
                None => break,
            }
        }
    }
    Ok(Value::Array(items))
}

/// HTML-escape `& < > " '`.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}
