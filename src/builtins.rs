//! The built-in function registry.
//!
//! Builtins dispatch through a plain function pointer table rather than a
//! string-matching `if` chain, keyed by a small numeric id rather than a
//! name, since the id is what the bytecode container actually carries
//! (`CALL id, argc`). A name table exists only at compile time, to turn a
//! call site's identifier into that id.

use crate::error::RuntimeError;
use crate::value::Value;
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

macro_rules! builtins {
    ($(($id:expr, $name:expr, $arity:expr)),* $(,)?) => {
        /// Look up a built-in's numeric id by name, used by the parser when
        /// lowering a call expression. Returns `None` for an ordinary user
        /// function call.
        pub fn id_for_name(name: &str) -> Option<u32> {
            match name {
                $($name => Some($id),)*
                _ => None,
            }
        }

        /// The declared arity of built-in `id`, for arity checking at the
        /// call site independent of the types of the arguments received.
        fn arity_of(id: u32) -> usize {
            match id {
                $($id => $arity,)*
                _ => unreachable!("unknown builtin id {id}"),
            }
        }
    };
}

builtins! {
    (0, "abs", 1),
    (1, "min", 2),
    (2, "max", 2),
    (3, "len", 1),
    (4, "upper", 1),
    (5, "lower", 1),
    (6, "trim", 1),
    (7, "startswith", 2),
    (8, "endswith", 2),
    (9, "contains", 2),
    (10, "parseint", 1),
    (11, "exists", 1),
    (12, "readfile", 1),
    (13, "writefile", 2),
    (14, "appendfile", 2),
    (15, "time", 0),
}

/// Invoke built-in `id` with `args` (already popped off the operand stack,
/// in left-to-right call order). Returns the single value the `CALL`
/// instruction pushes back.
pub fn call(id: u32, args: Vec<Value>, line: u32) -> Result<Value, RuntimeError> {
    let expected = arity_of(id);
    if args.len() != expected {
        return Err(RuntimeError::Type {
            message: format!(
                "built-in expects {expected} argument(s), got {}",
                args.len()
            ),
            line,
        });
    }

    match id {
        0 => abs(&args[0], line),
        1 => min(&args[0], &args[1], line),
        2 => max(&args[0], &args[1], line),
        3 => len(&args[0], line),
        4 => upper(&args[0], line),
        5 => lower(&args[0], line),
        6 => trim(&args[0], line),
        7 => startswith(&args[0], &args[1], line),
        8 => endswith(&args[0], &args[1], line),
        9 => contains(&args[0], &args[1], line),
        10 => parseint(&args[0], line),
        11 => exists(&args[0], line),
        12 => readfile(&args[0], line),
        13 => writefile(&args[0], &args[1], line),
        14 => appendfile(&args[0], &args[1], line),
        15 => Ok(time()),
        _ => unreachable!("unknown builtin id {id}"),
    }
}

fn type_err(line: u32, message: impl Into<String>) -> RuntimeError {
    RuntimeError::Type {
        message: message.into(),
        line,
    }
}

fn as_str<'a>(v: &'a Value, line: u32) -> Result<&'a str, RuntimeError> {
    match v {
        Value::String(s) => Ok(s),
        other => Err(type_err(
            line,
            format!("expected a string, found {}", other.type_name()),
        )),
    }
}

fn abs(v: &Value, line: u32) -> Result<Value, RuntimeError> {
    match v {
        Value::Int(i) => Ok(Value::Int(i.abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(type_err(
            line,
            format!("abs expects a number, found {}", other.type_name()),
        )),
    }
}

fn min(a: &Value, b: &Value, line: u32) -> Result<Value, RuntimeError> {
    numeric_pair(a, b, line, |x, y| x.min(y), |x, y| x.min(y))
}

fn max(a: &Value, b: &Value, line: u32) -> Result<Value, RuntimeError> {
    numeric_pair(a, b, line, |x, y| x.max(y), |x, y| x.max(y))
}

fn numeric_pair(
    a: &Value,
    b: &Value,
    line: u32,
    int_op: impl Fn(i64, i64) -> i64,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(int_op(*x, *y))),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(float_op(*x as f64, *y))),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(float_op(*x, *y as f64))),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(float_op(*x, *y))),
        _ => Err(type_err(line, "expected two numbers")),
    }
}

fn len(v: &Value, line: u32) -> Result<Value, RuntimeError> {
    Ok(Value::Int(as_str(v, line)?.chars().count() as i64))
}

fn upper(v: &Value, line: u32) -> Result<Value, RuntimeError> {
    Ok(Value::as_string(as_str(v, line)?.to_uppercase()))
}

fn lower(v: &Value, line: u32) -> Result<Value, RuntimeError> {
    Ok(Value::as_string(as_str(v, line)?.to_lowercase()))
}

fn trim(v: &Value, line: u32) -> Result<Value, RuntimeError> {
    Ok(Value::as_string(as_str(v, line)?.trim()))
}

fn startswith(s: &Value, prefix: &Value, line: u32) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(
        as_str(s, line)?.starts_with(as_str(prefix, line)?),
    ))
}

fn endswith(s: &Value, suffix: &Value, line: u32) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(
        as_str(s, line)?.ends_with(as_str(suffix, line)?),
    ))
}

fn contains(s: &Value, needle: &Value, line: u32) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(
        as_str(s, line)?.contains(as_str(needle, line)?),
    ))
}

fn parseint(v: &Value, line: u32) -> Result<Value, RuntimeError> {
    let s = as_str(v, line)?;
    s.trim()
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|_| type_err(line, format!("'{s}' is not a valid integer")))
}

fn exists(v: &Value, line: u32) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(
        fs::metadata(as_str(v, line)?).is_ok(),
    ))
}

fn readfile(v: &Value, line: u32) -> Result<Value, RuntimeError> {
    let path = as_str(v, line)?;
    fs::read_to_string(path)
        .map(Value::as_string)
        .map_err(|e| type_err(line, format!("could not read '{path}': {e}")))
}

fn writefile(path: &Value, contents: &Value, line: u32) -> Result<Value, RuntimeError> {
    let path = as_str(path, line)?;
    let contents = as_str(contents, line)?;
    fs::write(path, contents)
        .map(|_| Value::Nil)
        .map_err(|e| type_err(line, format!("could not write '{path}': {e}")))
}

fn appendfile(path: &Value, contents: &Value, line: u32) -> Result<Value, RuntimeError> {
    use std::io::Write;
    let path_str = as_str(path, line)?;
    let contents = as_str(contents, line)?;
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path_str)
        .map_err(|e| type_err(line, format!("could not open '{path_str}': {e}")))?;
    f.write_all(contents.as_bytes())
        .map(|_| Value::Nil)
        .map_err(|e| type_err(line, format!("could not append to '{path_str}': {e}")))
}

fn time() -> Value {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Value::Int(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_lookup_round_trips_known_names() {
        assert_eq!(id_for_name("abs"), Some(0));
        assert_eq!(id_for_name("time"), Some(15));
        assert_eq!(id_for_name("nope"), None);
    }

    #[test]
    fn abs_preserves_int_vs_float() {
        assert_eq!(abs(&Value::Int(-4), 1).unwrap(), Value::Int(4));
        assert_eq!(abs(&Value::Float(-4.5), 1).unwrap(), Value::Float(4.5));
    }

    #[test]
    fn string_builtins_operate_on_strings_only() {
        assert_eq!(len(&Value::as_string("hi"), 1).unwrap(), Value::Int(2));
        assert!(len(&Value::Int(1), 1).is_err());
    }

    #[test]
    fn call_checks_arity_before_dispatch() {
        let err = call(0, vec![], 7);
        assert!(matches!(err, Err(RuntimeError::Type { line: 7, .. })));
    }

    #[test]
    fn parseint_rejects_non_numeric_text() {
        assert!(parseint(&Value::as_string("abc"), 1).is_err());
        assert_eq!(
            parseint(&Value::as_string(" 42 "), 1).unwrap(),
            Value::Int(42)
        );
    }
}
