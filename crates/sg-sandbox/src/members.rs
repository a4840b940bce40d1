// members.rs — Native member resolution for sandbox values.
//
// This is the sandbox's reflection primitive: given a value and a name it
// produces the member. It is private to the crate and called only by the
// gate, after the attribute registry has allowed the access. Method names
// here mirror the default whitelist in sg-registry; a name missing on
// either side is simply unreachable.

use std::sync::Arc;

use crate::error::GateError;
use crate::value::{MethodFn, Value};

/// A resolved member.
pub(crate) enum Member {
    /// A field, constant or stored callable.
    Value(Value),
    /// A method that still needs its receiver.
    Method(Arc<MethodFn>),
}

const STR_METHODS: &[&str] = &[
    "upper",
    "lower",
    "strip",
    "split",
    "startswith",
    "endswith",
    "replace",
    "find",
    "contains",
    "isdigit",
    "len",
];
const LIST_METHODS: &[&str] = &["len", "contains", "index", "count", "get", "join"];
const INT_METHODS: &[&str] = &["abs"];
const FLOAT_METHODS: &[&str] = &["abs", "round", "floor", "ceil"];
const PATTERN_METHODS: &[&str] = &["findAll", "find", "test", "replace", "split"];

type Dispatch = fn(&str, &Value, &[Value]) -> Result<Value, GateError>;

/// Resolve `name` on `receiver`.
pub(crate) fn resolve(receiver: &Value, name: &str) -> Option<Member> {
    match receiver {
        Value::Str(_) if STR_METHODS.contains(&name) => Some(bind(name, str_call)),
        Value::List(_) if LIST_METHODS.contains(&name) => Some(bind(name, list_call)),
        Value::Int(_) if INT_METHODS.contains(&name) => Some(bind(name, int_call)),
        Value::Float(_) if FLOAT_METHODS.contains(&name) => Some(bind(name, float_call)),
        Value::Pattern(re) if name == "source" => Some(Member::Value(Value::from(re.as_str()))),
        Value::Pattern(_) if PATTERN_METHODS.contains(&name) => Some(bind(name, pattern_call)),
        Value::Function(func) if name == "name" => Some(Member::Value(Value::from(func.name()))),
        Value::BoundMethod(method) if name == "name" => {
            Some(Member::Value(Value::from(method.name())))
        }
        Value::Object(object) => {
            if let Some(value) = object.field(name) {
                Some(Member::Value(value))
            } else if object.has_method(name) {
                let name = name.to_string();
                let func: Arc<MethodFn> = Arc::new(move |receiver: &Value, args: &[Value]| {
                    match receiver {
                        Value::Object(object) => object.call_method(&name, args),
                        other => Err(GateError::NotCallable {
                            type_name: other.type_kind().to_string(),
                        }),
                    }
                });
                Some(Member::Method(func))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn bind(name: &str, dispatch: Dispatch) -> Member {
    let name = name.to_string();
    let func: Arc<MethodFn> =
        Arc::new(move |receiver: &Value, args: &[Value]| dispatch(&name, receiver, args));
    Member::Method(func)
}

// ── Argument helpers ──

fn expect_arity(callee: &str, args: &[Value], min: usize, max: usize) -> Result<(), GateError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(GateError::invalid_args(
            callee,
            format!("expected {} argument(s), got {}", expected, args.len()),
        ));
    }
    Ok(())
}

fn str_arg<'a>(callee: &str, args: &'a [Value], index: usize) -> Result<&'a str, GateError> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| GateError::invalid_args(callee, format!("argument {} must be a string", index + 1)))
}

fn to_int(callee: &str, x: f64) -> Result<Value, GateError> {
    // `i64::MAX as f64` rounds up to 2^63, which is already out of range.
    if !x.is_finite() || x < i64::MIN as f64 || x >= i64::MAX as f64 {
        return Err(GateError::invalid_args(callee, "value out of integer range"));
    }
    Ok(Value::Int(x as i64))
}

// ── Built-in types ──

fn str_call(name: &str, receiver: &Value, args: &[Value]) -> Result<Value, GateError> {
    let callee = format!("str.{}", name);
    let s = receiver
        .as_str()
        .ok_or_else(|| GateError::invalid_args(&callee, "receiver is not a string"))?;

    match name {
        "upper" | "lower" | "strip" | "isdigit" | "len" => {
            expect_arity(&callee, args, 0, 0)?;
            Ok(match name {
                "upper" => Value::from(s.to_uppercase()),
                "lower" => Value::from(s.to_lowercase()),
                "strip" => Value::from(s.trim()),
                "isdigit" => Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())),
                _ => Value::Int(s.chars().count() as i64),
            })
        }
        "split" => {
            expect_arity(&callee, args, 0, 1)?;
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Null) => s.split_whitespace().map(Value::from).collect(),
                Some(_) => {
                    let sep = str_arg(&callee, args, 0)?;
                    if sep.is_empty() {
                        return Err(GateError::invalid_args(&callee, "empty separator"));
                    }
                    s.split(sep).map(Value::from).collect()
                }
            };
            Ok(Value::List(parts))
        }
        "startswith" | "endswith" | "contains" => {
            expect_arity(&callee, args, 1, 1)?;
            let needle = str_arg(&callee, args, 0)?;
            Ok(Value::Bool(match name {
                "startswith" => s.starts_with(needle),
                "endswith" => s.ends_with(needle),
                _ => s.contains(needle),
            }))
        }
        "replace" => {
            expect_arity(&callee, args, 2, 2)?;
            let from = str_arg(&callee, args, 0)?;
            let to = str_arg(&callee, args, 1)?;
            if from.is_empty() {
                return Err(GateError::invalid_args(&callee, "empty pattern"));
            }
            Ok(Value::from(s.replace(from, to)))
        }
        "find" => {
            expect_arity(&callee, args, 1, 1)?;
            let needle = str_arg(&callee, args, 0)?;
            // Character index, not byte offset.
            let index = s
                .find(needle)
                .map(|byte| s[..byte].chars().count() as i64)
                .unwrap_or(-1);
            Ok(Value::Int(index))
        }
        _ => Err(GateError::access_denied("str", name)),
    }
}

fn list_call(name: &str, receiver: &Value, args: &[Value]) -> Result<Value, GateError> {
    let callee = format!("list.{}", name);
    let items = receiver
        .as_list()
        .ok_or_else(|| GateError::invalid_args(&callee, "receiver is not a list"))?;

    match name {
        "len" => {
            expect_arity(&callee, args, 0, 0)?;
            Ok(Value::Int(items.len() as i64))
        }
        "contains" => {
            expect_arity(&callee, args, 1, 1)?;
            Ok(Value::Bool(items.contains(&args[0])))
        }
        "index" => {
            expect_arity(&callee, args, 1, 1)?;
            let index = items
                .iter()
                .position(|item| item == &args[0])
                .map(|i| i as i64)
                .unwrap_or(-1);
            Ok(Value::Int(index))
        }
        "count" => {
            expect_arity(&callee, args, 1, 1)?;
            Ok(Value::Int(items.iter().filter(|item| *item == &args[0]).count() as i64))
        }
        "get" => {
            expect_arity(&callee, args, 1, 1)?;
            let index = args[0]
                .as_int()
                .ok_or_else(|| GateError::invalid_args(&callee, "index must be an integer"))?;
            Ok(usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or(Value::Null))
        }
        "join" => {
            expect_arity(&callee, args, 1, 1)?;
            let sep = str_arg(&callee, args, 0)?;
            let parts = items
                .iter()
                .map(|item| {
                    item.as_str()
                        .ok_or_else(|| GateError::invalid_args(&callee, "elements must be strings"))
                })
                .collect::<Result<Vec<&str>, GateError>>()?;
            Ok(Value::from(parts.join(sep)))
        }
        _ => Err(GateError::access_denied("list", name)),
    }
}

fn int_call(name: &str, receiver: &Value, args: &[Value]) -> Result<Value, GateError> {
    let callee = format!("int.{}", name);
    let i = receiver
        .as_int()
        .ok_or_else(|| GateError::invalid_args(&callee, "receiver is not an int"))?;
    match name {
        "abs" => {
            expect_arity(&callee, args, 0, 0)?;
            i.checked_abs()
                .map(Value::Int)
                .ok_or_else(|| GateError::invalid_args(&callee, "integer overflow"))
        }
        _ => Err(GateError::access_denied("int", name)),
    }
}

fn float_call(name: &str, receiver: &Value, args: &[Value]) -> Result<Value, GateError> {
    let callee = format!("float.{}", name);
    let Value::Float(x) = receiver else {
        return Err(GateError::invalid_args(&callee, "receiver is not a float"));
    };
    expect_arity(&callee, args, 0, 0)?;
    match name {
        "abs" => Ok(Value::Float(x.abs())),
        "round" => to_int(&callee, x.round()),
        "floor" => to_int(&callee, x.floor()),
        "ceil" => to_int(&callee, x.ceil()),
        _ => Err(GateError::access_denied("float", name)),
    }
}

fn pattern_call(name: &str, receiver: &Value, args: &[Value]) -> Result<Value, GateError> {
    let callee = format!("Pattern.{}", name);
    let Value::Pattern(re) = receiver else {
        return Err(GateError::invalid_args(&callee, "receiver is not a pattern"));
    };

    match name {
        "findAll" | "find" | "test" | "split" => {
            expect_arity(&callee, args, 1, 1)?;
            let text = str_arg(&callee, args, 0)?;
            Ok(match name {
                "findAll" => Value::List(re.find_iter(text).map(|m| Value::from(m.as_str())).collect()),
                "find" => re
                    .find(text)
                    .map(|m| Value::from(m.as_str()))
                    .unwrap_or(Value::Null),
                "test" => Value::Bool(re.is_match(text)),
                _ => Value::List(re.split(text).map(Value::from).collect()),
            })
        }
        "replace" => {
            expect_arity(&callee, args, 2, 2)?;
            let text = str_arg(&callee, args, 0)?;
            let replacement = str_arg(&callee, args, 1)?;
            Ok(Value::from(re.replace_all(text, replacement).into_owned()))
        }
        _ => Err(GateError::access_denied("Pattern", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(receiver: &Value, name: &str, args: &[Value]) -> Result<Value, GateError> {
        match resolve(receiver, name) {
            Some(Member::Method(func)) => func(receiver, args),
            Some(Member::Value(_)) => panic!("{} is not a method", name),
            None => panic!("{} did not resolve", name),
        }
    }

    #[test]
    fn string_methods() {
        let s = Value::from("  Hello World  ");
        assert_eq!(call(&s, "strip", &[]).unwrap(), Value::from("Hello World"));
        assert_eq!(call(&s, "upper", &[]).unwrap(), Value::from("  HELLO WORLD  "));
        assert_eq!(
            call(&s, "split", &[]).unwrap(),
            Value::List(vec!["Hello".into(), "World".into()])
        );
        assert_eq!(call(&Value::from("héllo"), "find", &["l".into()]).unwrap(), Value::Int(2));
        assert_eq!(call(&Value::from("123"), "isdigit", &[]).unwrap(), Value::Bool(true));
        assert_eq!(call(&Value::from(""), "isdigit", &[]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn arity_is_checked() {
        let err = call(&Value::from("x"), "upper", &["y".into()]).unwrap_err();
        assert!(matches!(err, GateError::InvalidArguments { .. }));
        assert!(call(&Value::from("a,b"), "split", &["".into()]).is_err());
    }

    #[test]
    fn list_methods() {
        let list = Value::List(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(call(&list, "count", &["a".into()]).unwrap(), Value::Int(2));
        assert_eq!(call(&list, "index", &["b".into()]).unwrap(), Value::Int(1));
        assert_eq!(call(&list, "get", &[Value::Int(-1)]).unwrap(), Value::Null);
        assert_eq!(call(&list, "join", &["-".into()]).unwrap(), Value::from("a-b-a"));
        let mixed = Value::List(vec![Value::Int(1)]);
        assert!(call(&mixed, "join", &[",".into()]).is_err());
    }

    #[test]
    fn numeric_methods() {
        assert_eq!(call(&Value::Int(-4), "abs", &[]).unwrap(), Value::Int(4));
        assert!(call(&Value::Int(i64::MIN), "abs", &[]).is_err());
        assert_eq!(call(&Value::Float(2.5), "floor", &[]).unwrap(), Value::Int(2));
        assert!(call(&Value::Float(f64::NAN), "round", &[]).is_err());
    }

    #[test]
    fn float_to_int_rejects_values_at_the_upper_bound() {
        let two_pow_63 = 9_223_372_036_854_775_808.0_f64;
        assert!(call(&Value::Float(two_pow_63), "floor", &[]).is_err());
        assert!(call(&Value::Float(two_pow_63 * 2.0), "ceil", &[]).is_err());

        let min = i64::MIN as f64;
        assert_eq!(call(&Value::Float(min), "round", &[]).unwrap(), Value::Int(i64::MIN));
        let largest_below = 9_223_372_036_854_774_784.0_f64;
        assert_eq!(
            call(&Value::Float(largest_below), "floor", &[]).unwrap(),
            Value::Int(9_223_372_036_854_774_784)
        );
    }

    #[test]
    fn pattern_methods() {
        let pattern = Value::pattern(r"\d+").unwrap();
        assert_eq!(
            call(&pattern, "findAll", &["a1 b22".into()]).unwrap(),
            Value::List(vec!["1".into(), "22".into()])
        );
        assert_eq!(call(&pattern, "find", &["none".into()]).unwrap(), Value::Null);
        assert_eq!(
            call(&pattern, "replace", &["a1b2".into(), "#".into()]).unwrap(),
            Value::from("a#b#")
        );
        match resolve(&pattern, "source") {
            Some(Member::Value(v)) => assert_eq!(v, Value::from(r"\d+")),
            _ => panic!("source should be a field"),
        }
    }

    #[test]
    fn unknown_names_do_not_resolve() {
        assert!(resolve(&Value::from("x"), "__class__").is_none());
        assert!(resolve(&Value::from("x"), "encode").is_none());
        assert!(resolve(&Value::Null, "anything").is_none());
        assert!(resolve(&Value::map([("k", 1i64)]), "k").is_none());
    }
}
