//! Expression evaluation.
//!
//! Evaluation walks the AST against a [`Scope`]. Identifiers resolve in the
//! scope first and then against a small set of globals (`Math`, `JSON`,
//! `String`, `parseInt`, ...). Operators follow the loose scripting rules the
//! [`Value`] type already implements: `+` concatenates as soon as either side
//! is a string, `<` on two strings compares them lexicographically, and
//! property reads on `null` / `undefined` are errors unless written with `?.`.

use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};

use super::ast::{BinaryOp, Expr, LogicalOp, TemplatePart, UnaryOp};
use crate::template::Scope;
use crate::value::{format_number, Function, Object, Value};

pub type EvalResult<T> = std::result::Result<T, String>;

/// Longest string `repeat` and `padStart`/`padEnd` may produce.
const MAX_BUILT_STRING: f64 = 1e6;

/// Evaluate `expr` in `scope`.
pub fn eval(expr: &Expr, scope: &Scope) -> EvalResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Ident(name) => lookup(name, scope),
        Expr::Template(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    TemplatePart::Str(text) => out.push_str(text),
                    TemplatePart::Expr(expr) => out.push_str(&eval(expr, scope)?.to_display_string()),
                }
            }
            Ok(Value::String(out))
        }
        Expr::Array(items) => items
            .iter()
            .map(|item| eval(item, scope))
            .collect::<EvalResult<Vec<_>>>()
            .map(Value::Array),
        Expr::Object(entries) => {
            let mut map = Object::with_capacity(entries.len());
            for (key, value) in entries {
                map.insert(key.clone(), eval(value, scope)?);
            }
            Ok(Value::Object(map))
        }
        Expr::Member { .. } | Expr::Index { .. } | Expr::Call { .. } => {
            Ok(chain(expr, scope)?.unwrap_or_default())
        }
        Expr::Unary { op, expr } => unary(*op, expr, scope),
        Expr::Binary { op, left, right } => {
            let left = eval(left, scope)?;
            let right = eval(right, scope)?;
            Ok(binary(*op, left, right))
        }
        Expr::Logical { op, left, right } => {
            let left = eval(left, scope)?;
            let short = match op {
                LogicalOp::And => !left.is_truthy(),
                LogicalOp::Or => left.is_truthy(),
                LogicalOp::Nullish => !left.is_nullish(),
            };
            if short {
                Ok(left)
            } else {
                eval(right, scope)
            }
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            if eval(test, scope)?.is_truthy() {
                eval(consequent, scope)
            } else {
                eval(alternate, scope)
            }
        }
        Expr::Arrow { params, body } => Ok(arrow(params, body, scope)),
    }
}

/// Evaluate a member/index/call chain. `None` means an optional link hit
/// `null` / `undefined` and the rest of the chain was skipped.
fn chain(expr: &Expr, scope: &Scope) -> EvalResult<Option<Value>> {
    match expr {
        Expr::Member {
            object,
            property,
            optional,
        } => {
            let Some(object) = chain(object, scope)? else {
                return Ok(None);
            };
            if *optional && object.is_nullish() {
                return Ok(None);
            }
            read_member(&object, property).map(Some)
        }
        Expr::Index {
            object,
            index,
            optional,
        } => {
            let Some(object) = chain(object, scope)? else {
                return Ok(None);
            };
            if *optional && object.is_nullish() {
                return Ok(None);
            }
            let key = property_key(&eval(index, scope)?);
            read_member(&object, &key).map(Some)
        }
        Expr::Call {
            callee,
            args,
            optional,
        } => call(callee, args, *optional, scope),
        other => eval(other, scope).map(Some),
    }
}

fn call(callee: &Expr, args: &[Expr], optional: bool, scope: &Scope) -> EvalResult<Option<Value>> {
    // Method calls keep their receiver so builtins can see it.
    if let Expr::Member {
        object,
        property,
        optional: member_optional,
    } = callee
    {
        let Some(receiver) = chain(object, scope)? else {
            return Ok(None);
        };
        if *member_optional && receiver.is_nullish() {
            return Ok(None);
        }
        let args = arguments(args, scope)?;
        if let Some(result) = builtin_method(&receiver, property, &args)? {
            return Ok(Some(result));
        }
        let function = read_member(&receiver, property)?;
        if optional && function.is_nullish() {
            return Ok(None);
        }
        return invoke(&function, &args, property).map(Some);
    }

    let Some(function) = chain(callee, scope)? else {
        return Ok(None);
    };
    if optional && function.is_nullish() {
        return Ok(None);
    }
    let args = arguments(args, scope)?;
    let name = match callee {
        Expr::Ident(name) => name.as_str(),
        _ => "expression",
    };
    invoke(&function, &args, name).map(Some)
}

fn arguments(args: &[Expr], scope: &Scope) -> EvalResult<Vec<Value>> {
    args.iter().map(|arg| eval(arg, scope)).collect()
}

fn invoke(function: &Value, args: &[Value], name: &str) -> EvalResult<Value> {
    match function {
        Value::Function(f) => Ok(f.call(args)),
        _ => Err(format!("{name} is not a function")),
    }
}

fn read_member(object: &Value, property: &str) -> EvalResult<Value> {
    object.member(property).ok_or_else(|| {
        format!(
            "cannot read properties of {} (reading '{property}')",
            object.to_display_string()
        )
    })
}

fn property_key(index: &Value) -> String {
    match index {
        Value::Number(n) => format_number(*n),
        other => other.to_display_string(),
    }
}

fn lookup(name: &str, scope: &Scope) -> EvalResult<Value> {
    if let Some(value) = scope.get(name) {
        return Ok(value.clone());
    }
    globals()
        .get(name)
        .cloned()
        .ok_or_else(|| format!("{name} is not defined"))
}

fn arrow(params: &[String], body: &Arc<Expr>, scope: &Scope) -> Value {
    let params = params.to_vec();
    let body = Arc::clone(body);
    let scope = scope.clone();
    Value::Function(Function::new(move |args| {
        let bindings = params
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), args.get(i).cloned().unwrap_or_default()));
        let inner = scope.child(bindings);
        eval(&body, &inner).unwrap_or_else(|reason| {
            tracing::debug!(%reason, "arrow function failed");
            Value::Undefined
        })
    }))
}

// ----------------------------------------------------------------------------
// Operators
// ----------------------------------------------------------------------------

fn unary(op: UnaryOp, operand: &Expr, scope: &Scope) -> EvalResult<Value> {
    let value = match (op, operand) {
        // `typeof missing` is not an error
        (UnaryOp::TypeOf, Expr::Ident(name)) => lookup(name, scope).unwrap_or_default(),
        _ => eval(operand, scope)?,
    };
    Ok(match op {
        UnaryOp::Not => Value::Bool(!value.is_truthy()),
        UnaryOp::Neg => Value::Number(-value.to_number()),
        UnaryOp::Plus => Value::Number(value.to_number()),
        UnaryOp::TypeOf => Value::from(type_of(&value)),
    })
}

fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Function(_) => "function",
        Value::Null
        | Value::Array(_)
        | Value::Object(_)
        | Value::Reactive(_)
        | Value::Ref(_)
        | Value::Node(_) => "object",
    }
}

fn to_primitive(value: Value) -> Value {
    match value {
        Value::Ref(cell) => to_primitive(cell.get()),
        Value::Array(_)
        | Value::Object(_)
        | Value::Reactive(_)
        | Value::Function(_)
        | Value::Node(_) => Value::String(value.to_display_string()),
        other => other,
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Value {
    match op {
        BinaryOp::Add => {
            let (left, right) = (to_primitive(left), to_primitive(right));
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                let mut out = left.to_display_string();
                out.push_str(&right.to_display_string());
                Value::String(out)
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Mod => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Lt => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::Gt => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::Le => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Ge => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::Eq => Value::Bool(left.loose_eq(&right)),
        BinaryOp::Ne => Value::Bool(!left.loose_eq(&right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_eq(&right)),
        BinaryOp::StrictNe => Value::Bool(!left.strict_eq(&right)),
    }
}

/// Relational ordering. `None` when either side is NaN.
fn compare(left: Value, right: Value) -> Option<Ordering> {
    match (to_primitive(left), to_primitive(right)) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(&b)),
        (a, b) => a.to_number().partial_cmp(&b.to_number()),
    }
}

// ----------------------------------------------------------------------------
// Builtin methods
// ----------------------------------------------------------------------------

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

/// Resolve a possibly negative, possibly missing index against `len`.
fn relative_index(value: Option<&Value>, len: usize, default: usize) -> usize {
    match value {
        None | Some(Value::Undefined) => default,
        Some(value) => {
            let n = value.to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                (n as usize).min(len)
            }
        }
    }
}

fn builtin_method(receiver: &Value, name: &str, args: &[Value]) -> EvalResult<Option<Value>> {
    match receiver {
        Value::String(s) => string_method(s, name, args),
        Value::Array(items) => array_method(items, name, args),
        Value::Number(n) => Ok(number_method(*n, name, args)),
        Value::Bool(_) if name == "toString" => Ok(Some(Value::String(receiver.to_display_string()))),
        _ => Ok(None),
    }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> EvalResult<Option<Value>> {
    let text = |i: usize| arg(args, i).to_display_string();
    let chars: Vec<char> = s.chars().collect();
    let value = match name {
        "toUpperCase" => Value::from(s.to_uppercase()),
        "toLowerCase" => Value::from(s.to_lowercase()),
        "trim" => Value::from(s.trim()),
        "trimStart" => Value::from(s.trim_start()),
        "trimEnd" => Value::from(s.trim_end()),
        "toString" => Value::from(s),
        "includes" => Value::Bool(s.contains(text(0).as_str())),
        "startsWith" => Value::Bool(s.starts_with(text(0).as_str())),
        "endsWith" => Value::Bool(s.ends_with(text(0).as_str())),
        "indexOf" => Value::Number(match s.find(text(0).as_str()) {
            Some(byte) => s[..byte].chars().count() as f64,
            None => -1.0,
        }),
        "charAt" => {
            let i = relative_index(args.first(), chars.len(), 0);
            Value::String(chars.get(i).map(char::to_string).unwrap_or_default())
        }
        "slice" | "substring" => {
            let start = relative_index(args.first(), chars.len(), 0);
            let end = relative_index(args.get(1), chars.len(), chars.len());
            let (start, end) = if name == "substring" && start > end {
                (end, start)
            } else {
                (start, end)
            };
            Value::String(chars.get(start..end.max(start)).unwrap_or_default().iter().collect())
        }
        "split" => {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Undefined) => vec![Value::from(s)],
                Some(sep) => {
                    let sep = sep.to_display_string();
                    if sep.is_empty() {
                        chars.iter().map(|c| Value::String(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(Value::from).collect()
                    }
                }
            };
            Value::Array(parts)
        }
        "replace" => Value::String(s.replacen(text(0).as_str(), &text(1), 1)),
        "replaceAll" => Value::String(s.replace(text(0).as_str(), &text(1))),
        "repeat" => {
            let count = arg(args, 0).to_number();
            if !(0.0..=MAX_BUILT_STRING).contains(&count) {
                return Err(format!("invalid repeat count: {}", format_number(count)));
            }
            Value::String(s.repeat(count as usize))
        }
        "padStart" | "padEnd" => {
            let width = arg(args, 0).to_number().max(0.0);
            if width > MAX_BUILT_STRING {
                return Err(format!("invalid pad width: {}", format_number(width)));
            }
            let width = width as usize;
            let fill = match args.get(1) {
                None | Some(Value::Undefined) => " ".to_string(),
                Some(fill) => fill.to_display_string(),
            };
            let missing = width.saturating_sub(chars.len());
            let pad: String = fill.chars().cycle().take(missing).collect();
            if fill.is_empty() || missing == 0 {
                Value::from(s)
            } else if name == "padStart" {
                Value::String(pad + s)
            } else {
                Value::String(s.to_string() + &pad)
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn array_method(items: &[Value], name: &str, args: &[Value]) -> EvalResult<Option<Value>> {
    let callback = || args.first().cloned().unwrap_or_default();
    let apply = |f: &Value, item: &Value, i: usize| invoke(f, &[item.clone(), Value::from(i)], name);

    let value = match name {
        "map" => {
            let f = callback();
            items
                .iter()
                .enumerate()
                .map(|(i, item)| apply(&f, item, i))
                .collect::<EvalResult<Vec<_>>>()
                .map(Value::Array)?
        }
        "filter" => {
            let f = callback();
            let mut kept = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if apply(&f, item, i)?.is_truthy() {
                    kept.push(item.clone());
                }
            }
            Value::Array(kept)
        }
        "find" | "findIndex" => {
            let f = callback();
            let mut found = None;
            for (i, item) in items.iter().enumerate() {
                if apply(&f, item, i)?.is_truthy() {
                    found = Some((i, item));
                    break;
                }
            }
            match (name, found) {
                ("find", Some((_, item))) => item.clone(),
                ("find", None) => Value::Undefined,
                (_, Some((i, _))) => Value::from(i),
                (_, None) => Value::Number(-1.0),
            }
        }
        "some" | "every" => {
            let f = callback();
            let want = name == "some";
            let mut result = !want;
            for (i, item) in items.iter().enumerate() {
                if apply(&f, item, i)?.is_truthy() == want {
                    result = want;
                    break;
                }
            }
            Value::Bool(result)
        }
        "reduce" => {
            let f = callback();
            let mut iter = items.iter().enumerate();
            let mut acc = match args.get(1) {
                Some(init) => init.clone(),
                None => match iter.next() {
                    Some((_, first)) => first.clone(),
                    None => return Err("reduce of empty array with no initial value".to_string()),
                },
            };
            for (i, item) in iter {
                acc = invoke(&f, &[acc, item.clone(), Value::from(i)], name)?;
            }
            acc
        }
        "includes" => {
            let needle = arg(args, 0);
            Value::Bool(items.iter().any(|item| item.strict_eq(&needle)))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            match items.iter().position(|item| item.strict_eq(&needle)) {
                Some(i) => Value::from(i),
                None => Value::Number(-1.0),
            }
        }
        "join" => {
            let sep = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(sep) => sep.to_display_string(),
            };
            let parts: Vec<String> = items
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_display_string()
                    }
                })
                .collect();
            Value::String(parts.join(&sep))
        }
        "slice" => {
            let start = relative_index(args.first(), items.len(), 0);
            let end = relative_index(args.get(1), items.len(), items.len());
            Value::Array(items.get(start..end.max(start)).unwrap_or_default().to_vec())
        }
        "concat" => {
            let mut out = items.to_vec();
            for extra in args {
                match extra {
                    Value::Array(more) => out.extend(more.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Value::Array(out)
        }
        "reverse" => Value::Array(items.iter().rev().cloned().collect()),
        "at" => {
            let len = items.len() as f64;
            let n = arg(args, 0).to_number().trunc();
            let i = if n < 0.0 { len + n } else { n };
            if i >= 0.0 && i < len {
                items[i as usize].clone()
            } else {
                Value::Undefined
            }
        }
        "toString" => Value::String(Value::Array(items.to_vec()).to_display_string()),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn number_method(n: f64, name: &str, args: &[Value]) -> Option<Value> {
    match name {
        "toFixed" => {
            let digits = arg(args, 0).to_number();
            let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 100.0) as usize };
            Some(Value::String(if n.is_finite() {
                format!("{n:.digits$}")
            } else {
                format_number(n)
            }))
        }
        "toString" => Some(Value::String(format_number(n))),
        _ => None,
    }
}

// ----------------------------------------------------------------------------
// Globals
// ----------------------------------------------------------------------------

fn globals() -> &'static Object {
    static GLOBALS: OnceLock<Object> = OnceLock::new();
    GLOBALS.get_or_init(build_globals)
}

fn func<F>(f: F) -> Value
where
    F: Fn(&[Value]) -> Value + Send + Sync + 'static,
{
    Value::Function(Function::new(f))
}

fn math_fn(f: fn(f64) -> f64) -> Value {
    func(move |args| Value::Number(f(arg(args, 0).to_number())))
}

fn namespace<const N: usize>(entries: [(&str, Value); N]) -> Value {
    Value::Object(
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    )
}

fn build_globals() -> Object {
    let math = namespace([
        ("PI", Value::Number(std::f64::consts::PI)),
        ("E", Value::Number(std::f64::consts::E)),
        ("floor", math_fn(f64::floor)),
        ("ceil", math_fn(f64::ceil)),
        // Halves round up, matching Math.round
        ("round", math_fn(|n| (n + 0.5).floor())),
        ("trunc", math_fn(f64::trunc)),
        ("abs", math_fn(f64::abs)),
        ("sqrt", math_fn(f64::sqrt)),
        ("sign", math_fn(|n| if n == 0.0 || n.is_nan() { n } else { n.signum() })),
        (
            "pow",
            func(|args| Value::Number(arg(args, 0).to_number().powf(arg(args, 1).to_number()))),
        ),
        (
            "min",
            func(|args| {
                Value::Number(args.iter().map(Value::to_number).fold(f64::INFINITY, |a, b| {
                    if a.is_nan() || b.is_nan() {
                        f64::NAN
                    } else {
                        a.min(b)
                    }
                }))
            }),
        ),
        (
            "max",
            func(|args| {
                Value::Number(args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, |a, b| {
                    if a.is_nan() || b.is_nan() {
                        f64::NAN
                    } else {
                        a.max(b)
                    }
                }))
            }),
        ),
    ]);

    let json = namespace([(
        "stringify",
        func(|args| match args.first() {
            None | Some(Value::Undefined) | Some(Value::Function(_)) => Value::Undefined,
            Some(value) => serde_json::to_string(&compact_json(value.to_json()))
                .map(Value::String)
                .unwrap_or_default(),
        }),
    )]);

    let array = namespace([(
        "isArray",
        func(|args| Value::Bool(matches!(args.first(), Some(Value::Array(_))))),
    )]);

    let object = namespace([
        ("keys", func(|args| object_entries(args, |k, _| Value::from(k)))),
        ("values", func(|args| object_entries(args, |_, v| v))),
        (
            "entries",
            func(|args| object_entries(args, |k, v| Value::Array(vec![Value::from(k), v]))),
        ),
    ]);

    Object::from_iter([
        ("NaN".to_string(), Value::Number(f64::NAN)),
        ("Infinity".to_string(), Value::Number(f64::INFINITY)),
        ("Math".to_string(), math),
        ("JSON".to_string(), json),
        ("Array".to_string(), array),
        ("Object".to_string(), object),
        (
            "String".to_string(),
            func(|args| Value::String(args.first().map(Value::to_display_string).unwrap_or_default())),
        ),
        (
            "Number".to_string(),
            func(|args| Value::Number(args.first().map_or(0.0, Value::to_number))),
        ),
        (
            "Boolean".to_string(),
            func(|args| Value::Bool(arg(args, 0).is_truthy())),
        ),
        (
            "isNaN".to_string(),
            func(|args| Value::Bool(arg(args, 0).to_number().is_nan())),
        ),
        (
            "parseInt".to_string(),
            func(|args| Value::Number(parse_int(&arg(args, 0).to_display_string(), &arg(args, 1)))),
        ),
        (
            "parseFloat".to_string(),
            func(|args| Value::Number(parse_float(&arg(args, 0).to_display_string()))),
        ),
    ])
}

fn object_entries(args: &[Value], f: impl Fn(String, Value) -> Value) -> Value {
    let entries: Vec<(String, Value)> = match args.first() {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Some(Value::Reactive(object)) => object
            .keys()
            .into_iter()
            .map(|k| {
                let v = object.get(&k);
                (k, v)
            })
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        _ => Vec::new(),
    };
    Value::Array(entries.into_iter().map(|(k, v)| f(k, v)).collect())
}

/// Integral floats print without a fraction, as script numbers do.
fn compact_json(json: serde_json::Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match json {
        Json::Number(n) => match n.as_f64() {
            Some(f) if f == f.trunc() && f.abs() < 9.0e15 => Json::from(f as i64),
            _ => Json::Number(n),
        },
        Json::Array(items) => Json::Array(items.into_iter().map(compact_json).collect()),
        Json::Object(map) => Json::Object(map.into_iter().map(|(k, v)| (k, compact_json(v))).collect()),
        other => other,
    }
}

fn parse_int(text: &str, radix: &Value) -> f64 {
    let text = text.trim_start();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, text.strip_prefix('+').unwrap_or(text)),
    };
    let radix = match radix.to_number() {
        r if r.is_nan() || r == 0.0 => 10,
        r if (2.0..=36.0).contains(&r) => r as u32,
        _ => return f64::NAN,
    };
    let digits = if radix == 16 {
        digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits)
    } else {
        digits
    };

    let mut value: Option<f64> = None;
    for c in digits.chars() {
        match c.to_digit(radix) {
            Some(d) => value = Some(value.unwrap_or(0.0) * f64::from(radix) + f64::from(d)),
            None => break,
        }
    }
    value.map_or(f64::NAN, |v| sign * v)
}

fn parse_float(text: &str) -> f64 {
    let text = text.trim_start();
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, text.strip_prefix('+').unwrap_or(text)),
    };
    if unsigned.starts_with("Infinity") {
        return sign * f64::INFINITY;
    }

    let numeric = unsigned
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')))
        .map_or(unsigned, |end| &unsigned[..end]);
    // Longest prefix that parses as a float
    (1..=numeric.len())
        .rev()
        .find_map(|end| numeric[..end].parse::<f64>().ok())
        .map_or(f64::NAN, |n| sign * n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, Reactive, Runtime};
    use crate::template::expr::parser::parse;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering as AtomicOrdering};

    fn scope(data: serde_json::Value) -> Scope {
        match Value::from(data) {
            Value::Object(vars) => Scope::new(vars),
            _ => Scope::default(),
        }
    }

    fn run(src: &str, scope: &Scope) -> EvalResult<Value> {
        eval(&parse(src)?, scope)
    }

    fn value(src: &str, data: serde_json::Value) -> Value {
        run(src, &scope(data)).unwrap()
    }

    #[test]
    fn arithmetic_and_concatenation() {
        assert_eq!(value("1 + 2 * 3", json!({})), Value::from(7));
        assert_eq!(value("count + 1", json!({ "count": 2 })), Value::from(3));
        assert_eq!(value("'n=' + 1", json!({})), Value::from("n=1"));
        assert_eq!(value("1 + '1'", json!({})), Value::from("11"));
        assert_eq!(value("7 % 4", json!({})), Value::from(3));
        assert_eq!(value("[1, 2] + ''", json!({})), Value::from("1,2"));
    }

    #[test]
    fn comparisons() {
        assert_eq!(value("'a' < 'b'", json!({})), Value::Bool(true));
        assert_eq!(value("'10' < 9", json!({})), Value::Bool(false));
        assert_eq!(value("n >= 3", json!({ "n": 3 })), Value::Bool(true));
        assert_eq!(value("1 == '1'", json!({})), Value::Bool(true));
        assert_eq!(value("1 === '1'", json!({})), Value::Bool(false));
        assert_eq!(value("NaN < 1 || NaN >= 1", json!({})), Value::Bool(false));
    }

    #[test]
    fn logical_operators_return_operands() {
        assert_eq!(value("name || 'anon'", json!({ "name": "" })), Value::from("anon"));
        assert_eq!(value("a && b", json!({ "a": 1, "b": 2 })), Value::from(2));
        assert_eq!(value("zero ?? 5", json!({ "zero": 0 })), Value::from(0));
        assert_eq!(value("missing ?? 5", json!({ "missing": null })), Value::from(5));
    }

    #[test]
    fn member_access_and_optional_chains() {
        let data = json!({ "user": { "name": "Ada", "tags": ["x", "y"] }, "none": null });
        assert_eq!(value("user.name", data.clone()), Value::from("Ada"));
        assert_eq!(value("user.tags[1]", data.clone()), Value::from("y"));
        assert_eq!(value("user['name']", data.clone()), Value::from("Ada"));
        assert_eq!(value("none?.name.first", data.clone()), Value::Undefined);
        assert_eq!(value("none?.name ?? 'x'", data.clone()), Value::from("x"));
        assert!(run("none.name", &scope(data)).is_err());
    }

    #[test]
    fn unknown_identifiers_are_errors_except_under_typeof() {
        let err = run("missing + 1", &Scope::default()).unwrap_err();
        assert!(err.contains("missing is not defined"));
        assert_eq!(value("typeof missing", json!({})), Value::from("undefined"));
        assert_eq!(value("typeof 'a'", json!({})), Value::from("string"));
        assert_eq!(value("typeof null", json!({})), Value::from("object"));
    }

    #[test]
    fn string_and_array_methods() {
        let data = json!({ "items": [1, 2, 3, 4], "name": "  Ada " });
        assert_eq!(value("name.trim().toUpperCase()", data.clone()), Value::from("ADA"));
        assert_eq!(value("items.filter(n => n % 2 === 0).join('-')", data.clone()), Value::from("2-4"));
        assert_eq!(value("items.map((n, i) => n * i)", data.clone()), Value::from(json!([0, 2, 6, 12])));
        assert_eq!(value("items.reduce((a, b) => a + b, 0)", data.clone()), Value::from(10));
        assert_eq!(value("items.slice(-2)", data.clone()), Value::from(json!([3, 4])));
        assert_eq!(value("items.includes(3)", data.clone()), Value::Bool(true));
        assert_eq!(value("'a,b'.split(',').length", data), Value::from(2));
        assert_eq!(value("(1.005).toFixed(1)", json!({})), Value::from("1.0"));
        assert_eq!(value("'5'.padStart(3, '0')", json!({})), Value::from("005"));
    }

    #[test]
    fn oversized_strings_are_refused() {
        let data = scope(json!({ "n": 2_000_000 }));
        assert!(run("'x'.repeat(n)", &data).is_err());
        assert!(run("'x'.padStart(n)", &data).is_err());
        assert!(run("'x'.padEnd(n, '-')", &data).is_err());
        assert_eq!(run("'x'.padEnd(3, '-')", &data), Ok(Value::from("x--")));
    }

    #[test]
    fn globals_are_available() {
        assert_eq!(value("Math.max(1, 5, 3)", json!({})), Value::from(5));
        assert_eq!(value("Math.round(2.5)", json!({})), Value::from(3));
        assert_eq!(value("parseInt('42px')", json!({})), Value::from(42));
        assert_eq!(value("parseFloat('3.5em')", json!({})), Value::from(3.5));
        assert_eq!(value("String(12)", json!({})), Value::from("12"));
        assert_eq!(value("Object.keys(o).join()", json!({ "o": { "a": 1, "b": 2 } })), Value::from("a,b"));
        assert_eq!(value("JSON.stringify(o)", json!({ "o": { "a": 1 } })), Value::from(r#"{"a":1}"#));
        assert_eq!(value("Array.isArray(o)", json!({ "o": [] })), Value::Bool(true));
    }

    #[test]
    fn scope_shadows_globals() {
        assert_eq!(value("Math", json!({ "Math": 1 })), Value::from(1));
    }

    #[test]
    fn template_literals_interpolate() {
        assert_eq!(value("`${a} + ${b} = ${a + b}`", json!({ "a": 1, "b": 2 })), Value::from("1 + 2 = 3"));
    }

    #[test]
    fn scope_functions_are_called_with_arguments() {
        let mut vars = Object::new();
        vars.insert(
            "double".to_string(),
            Value::Function(Function::new(|args| Value::Number(arg(args, 0).to_number() * 2.0))),
        );
        let scope = Scope::new(vars);
        assert_eq!(run("double(4)", &scope).unwrap(), Value::from(8));
        assert!(run("double.missing()", &scope).is_err());
    }

    #[test]
    fn arrows_capture_their_scope() {
        let scope = scope(json!({ "base": 10 }));
        let f = run("x => x + base", &scope).unwrap();
        let Value::Function(f) = f else {
            panic!("expected a function");
        };
        assert_eq!(f.call(&[Value::from(5)]), Value::from(15));
    }

    #[test]
    fn reactive_member_reads_are_tracked() {
        let rt = Runtime::new();
        let state = Reactive::new(&rt, [("count", 1)]);
        let vars = Object::from_iter([("state".to_string(), Value::from(state.clone()))]);
        let expr = parse("state.count * 2").unwrap();
        let runs = Arc::new(AtomicI32::new(0));

        let (r, scope) = (runs.clone(), Scope::new(vars));
        let _effect = Effect::new(&rt, move || {
            eval(&expr, &scope).unwrap();
            r.fetch_add(1, AtomicOrdering::SeqCst);
        });

        state.set("count", 2);
        assert_eq!(runs.load(AtomicOrdering::SeqCst), 2);
    }
}
